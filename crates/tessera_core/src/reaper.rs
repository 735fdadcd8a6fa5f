//! Reaper (spec.md §4.5): the periodic sweep that finds dead workers and
//! deadline-exceeded jobs and resolves both through the same CAS-guarded
//! transitions the dispatcher and completion handler use.

use std::time::Duration;

use tessera_db::{DbError, Pool};
use tessera_protocol::error::{ErrorCode, ErrorDetail};

use crate::completion::WebhookNotifier;
use crate::registry::WorkerRegistry;

pub const TICK_INTERVAL: Duration = Duration::from_secs(10);
/// Grace period added to `started_at + timeout_seconds` before a RUNNING
/// job is considered overdue (§4.5).
const DEADLINE_GRACE_SECONDS: i32 = 30;
/// §4.4/§4.5: worker-death failures are retried up to this many times
/// before the job gives up with `WORKER_ERROR`.
const MAX_RETRIES: u32 = crate::completion::MAX_RETRIES;

/// One reaper pass: requeue RUNNING jobs held by now-dead workers, then
/// fail RUNNING jobs whose deadline has passed regardless of their
/// worker's liveness. Returns `(requeued, timed_out)` counts for metrics.
pub async fn tick(
    pool: &Pool,
    registry: &WorkerRegistry,
    notifier: &dyn WebhookNotifier,
) -> Result<(usize, usize), DbError> {
    let requeued = reap_dead_workers(pool, registry).await?;
    let timed_out = reap_deadline_exceeded(pool, notifier).await?;
    registry.sweep_expired();
    Ok((requeued, timed_out))
}

async fn reap_dead_workers(pool: &Pool, registry: &WorkerRegistry) -> Result<usize, DbError> {
    let mut requeued = 0;
    for worker_id in registry.newly_dead_workers() {
        registry.mark_dead(worker_id);
        let orphaned = tessera_db::jobs::running_for_worker(pool, worker_id).await?;
        for job in orphaned {
            // The count *after* this death is what decides retry vs.
            // give-up (§8 S5: fails on the death event whose requeue would
            // bring `retry_count` to `MAX_RETRIES`).
            let next_retry_count = job.retry_count() + 1;
            if next_retry_count < MAX_RETRIES {
                if tessera_db::jobs::requeue(pool, job.id).await?.is_some() {
                    requeued += 1;
                }
            } else {
                let detail = ErrorDetail::new(ErrorCode::WorkerError, "worker died, retries exhausted")
                    .with_retry_available(false);
                if let Some(failed) = tessera_db::jobs::fail_retries_exhausted(pool, job.id, &detail).await? {
                    tessera_db::daily_usage::charge_failed(pool, failed.user_id).await?;
                }
            }
        }
    }
    Ok(requeued)
}

async fn reap_deadline_exceeded(pool: &Pool, notifier: &dyn WebhookNotifier) -> Result<usize, DbError> {
    let overdue = tessera_db::jobs::running_past_deadline(pool, DEADLINE_GRACE_SECONDS).await?;
    let mut timed_out = 0;
    for job in overdue {
        crate::completion::retry_or_fail(
            pool,
            notifier,
            job.id,
            tessera_protocol::worker::WorkerError {
                code: ErrorCode::WorkerTimeout,
                message: "job exceeded its deadline".to_string(),
            },
        )
        .await?;
        timed_out += 1;
    }
    Ok(timed_out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_protocol::worker::{HeartbeatPayload, WorkerStatus};

    #[test]
    fn newly_dead_workers_are_reported_once() {
        let registry = WorkerRegistry::new();
        let worker_id = tessera_ids::WorkerId::new();
        registry.record_heartbeat(&HeartbeatPayload {
            worker_id,
            status: WorkerStatus::Idle,
            capabilities: vec![],
            loaded_models: vec![],
            gpu_memory_used: None,
            uptime_seconds: 0,
            jobs_completed: 0,
            callback_port: 9000,
        });
        assert!(registry.newly_dead_workers().is_empty());
    }
}
