//! Completion handler (spec.md §4.4): turns a worker's `/run_job` reply
//! into job-state transitions, usage charges, and a webhook notification.
//!
//! Webhook delivery (HMAC signing, retry/backoff) lives in the `tessera`
//! binary crate, which owns the outbound HTTP client and the shared
//! secret. This module only decides *that* a notification is owed and
//! hands the decision off through the `WebhookNotifier` trait, so the
//! completion transaction never blocks on network retries.

use chrono::Utc;
use tessera_db::artifacts::NewArtifact;
use tessera_db::jobs::Job;
use tessera_db::{DbError, Pool};
use tessera_protocol::domain::Capability;
use tessera_protocol::error::{ErrorCode, ErrorDetail};
use tessera_protocol::webhook::WebhookEvent;
use tessera_protocol::worker::{ReportedArtifact, RunJobOutcome};

/// Automatic-retry budget for worker-reported transient failures (§4.4,
/// §7: `TIMEOUT`/`WORKER_ERROR` retry while `retry_count < 2`).
pub const MAX_RETRIES: u32 = 2;

/// Implemented by the binary crate to actually deliver a webhook. Kept
/// separate from this module so `tessera_core` never needs HMAC/signing
/// dependencies.
pub trait WebhookNotifier: Send + Sync {
    fn notify(&self, webhook_url: String, event: WebhookEvent, job: Job);
}

/// No-op notifier for call sites (and tests) with no webhook configured.
pub struct NullNotifier;
impl WebhookNotifier for NullNotifier {
    fn notify(&self, _webhook_url: String, _event: WebhookEvent, _job: Job) {}
}

fn webhook_url_of(job: &Job) -> Option<String> {
    job.metadata
        .0
        .get("webhook_url")
        .and_then(|v| v.as_str())
        .map(String::from)
}

fn to_new_artifact(job_id: tessera_ids::JobId, reported: ReportedArtifact) -> NewArtifact {
    NewArtifact {
        job_id,
        artifact_type: reported.artifact_type,
        format: reported.format,
        local_path: reported.path,
        url: reported.url,
        width: reported.width.map(|w| w as i32),
        height: reported.height.map(|h| h as i32),
        duration_seconds: reported.duration_seconds,
        file_size_bytes: reported.file_size_bytes,
        metadata: reported.metadata,
    }
}

/// Handle one member outcome from a worker's `RunJobResponse` (§4.4). The
/// caller is responsible for iterating `RunJobResponse::results` and
/// invoking this once per member; each member's CAS-guarded transition is
/// independent, so a partial batch failure never blocks its siblings.
pub async fn handle_outcome(
    pool: &Pool,
    notifier: &dyn WebhookNotifier,
    outcome: RunJobOutcome,
) -> Result<(), DbError> {
    match outcome {
        RunJobOutcome::Completed {
            job_id,
            execution_time_seconds,
            artifacts,
        } => handle_completed(pool, notifier, job_id, execution_time_seconds, artifacts).await,
        RunJobOutcome::Failed { job_id, error } => handle_failed(pool, notifier, job_id, error).await,
    }
}

async fn handle_completed(
    pool: &Pool,
    notifier: &dyn WebhookNotifier,
    job_id: tessera_ids::JobId,
    execution_time_seconds: f64,
    artifacts: Vec<ReportedArtifact>,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;
    let Some(job) = tessera_db::jobs::complete(&mut tx, job_id, execution_time_seconds).await? else {
        // Lost the CAS race to a cancel; nothing further to do (§5).
        tx.rollback().await?;
        return Ok(());
    };
    for reported in artifacts {
        let new_artifact = to_new_artifact(job_id, reported);
        tessera_db::artifacts::insert(&mut tx, new_artifact).await?;
    }
    tessera_db::daily_usage::charge_completed(&mut tx, job.user_id, job.capability, job.cost_tokens).await?;
    tx.commit().await?;

    if let Some(webhook_url) = webhook_url_of(&job) {
        notifier.notify(webhook_url, WebhookEvent::JobCompleted, job);
    }
    Ok(())
}

async fn handle_failed(
    pool: &Pool,
    notifier: &dyn WebhookNotifier,
    job_id: tessera_ids::JobId,
    error: tessera_protocol::worker::WorkerError,
) -> Result<(), DbError> {
    retry_or_fail(pool, notifier, job_id, error).await
}

/// Shared retry-or-terminate decision for any RUNNING->{QUEUED,FAILED}
/// transition triggered by an error (§4.1, §4.4): worker reply, dispatch
/// exception, or the reaper's deadline/death sweeps all funnel through
/// here so the retry budget is enforced exactly once.
pub(crate) async fn retry_or_fail(
    pool: &Pool,
    notifier: &dyn WebhookNotifier,
    job_id: tessera_ids::JobId,
    error: tessera_protocol::worker::WorkerError,
) -> Result<(), DbError> {
    let retryable = error.code.is_retryable();
    let current = tessera_db::jobs::get(pool, job_id).await?;
    let retry_count = current.as_ref().map(|j| j.retry_count()).unwrap_or(0);
    // The count *after* this failure is what decides retry vs. give-up
    // (§8 S5: the job fails on the death/failure event whose requeue would
    // bring `retry_count` to `MAX_RETRIES`, not the one after that).
    let next_retry_count = retry_count + 1;

    if retryable && next_retry_count < MAX_RETRIES {
        tessera_db::jobs::requeue(pool, job_id).await?;
        return Ok(());
    }

    let detail = ErrorDetail::new(error.code, error.message).with_retry_available(false);
    let failed = if retryable {
        tessera_db::jobs::fail_retries_exhausted(pool, job_id, &detail).await?
    } else {
        tessera_db::jobs::fail(pool, job_id, &detail).await?
    };
    let Some(job) = failed else {
        return Ok(());
    };
    tessera_db::daily_usage::charge_failed(pool, job.user_id).await?;

    if let Some(webhook_url) = webhook_url_of(&job) {
        notifier.notify(webhook_url, WebhookEvent::JobFailed, job);
    }
    Ok(())
}

/// A dispatch exception (network failure reaching the worker at all) is
/// treated as `WORKER_ERROR` with the usual retry rule (§4.4).
pub async fn handle_dispatch_exception(
    pool: &Pool,
    notifier: &dyn WebhookNotifier,
    job_id: tessera_ids::JobId,
    message: String,
) -> Result<(), DbError> {
    handle_failed(
        pool,
        notifier,
        job_id,
        tessera_protocol::worker::WorkerError {
            code: ErrorCode::WorkerError,
            message,
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_notifier_does_not_panic() {
        let notifier = NullNotifier;
        let job = dummy_job();
        notifier.notify("https://example.com/hook".into(), WebhookEvent::JobCompleted, job);
    }

    fn dummy_job() -> Job {
        use rust_decimal::Decimal;
        use tessera_ids::{JobId, UserId};
        use tessera_protocol::domain::{Frontend, JobStatus};
        Job {
            id: JobId::new(),
            user_id: UserId::new(),
            frontend: Frontend::Api,
            bot_id: None,
            capability: Capability::Image,
            status: JobStatus::Completed,
            priority: 0,
            params: sqlx::types::Json(serde_json::json!({})),
            workflow_id: None,
            cost_tokens: Decimal::ONE,
            timeout_seconds: 300,
            worker_id: None,
            created_at: Utc::now(),
            queued_at: None,
            started_at: None,
            ended_at: None,
            execution_time_seconds: None,
            error: None,
            metadata: sqlx::types::Json(serde_json::json!({})),
        }
    }
}
