//! Bounded retry for transient storage errors (spec.md §7: "connection
//! loss ... 3 attempts, 100/400/1600ms backoff, before surfacing
//! `INTERNAL`"). Only connection-level `sqlx::Error` variants are treated
//! as transient; a constraint violation or a bad query is a bug, not a
//! blip, and should fail on the first attempt.

use std::time::Duration;

use crate::error::DbError;

const BACKOFF: [Duration; 3] = [
    Duration::from_millis(100),
    Duration::from_millis(400),
    Duration::from_millis(1600),
];

fn is_transient(err: &DbError) -> bool {
    matches!(
        err,
        DbError::Sqlx(sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed)
    )
}

/// Run `op` up to `BACKOFF.len() + 1` times, sleeping the fixed schedule
/// between attempts, but only while the error looks transient. A
/// non-transient error (bad query, constraint violation) returns
/// immediately on its first occurrence.
pub async fn with_retry<F, Fut, T>(mut op: F) -> Result<T, DbError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, DbError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < BACKOFF.len() && is_transient(&err) => {
                tracing::warn!(attempt, %err, "transient storage error, retrying");
                tokio::time::sleep(BACKOFF[attempt]).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_immediately_without_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, DbError> = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(7) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_transient_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, DbError> = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DbError::NotFound("job".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
