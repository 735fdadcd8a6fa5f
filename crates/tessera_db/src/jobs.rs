//! Job repository: the lifecycle state machine of spec.md §4.1, persisted
//! transactionally. Every non-terminal transition is expressed as an
//! `UPDATE ... WHERE status = $expected`, the same atomic-CAS-by-WHERE-clause
//! idiom the control plane uses everywhere a dispatcher and a cancel might
//! race (spec.md §5). A CAS that affects zero rows means the loser observed
//! a state that had already moved; callers treat that as `STATE_CONFLICT`
//! or simply drop the candidate, depending on context.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::FromRow;
use tessera_ids::{JobId, UserId, WorkerId};
use tessera_protocol::domain::{Capability, Frontend, JobStatus};
use tessera_protocol::error::ErrorDetail;

use crate::error::Result;
use crate::Pool;

#[derive(Debug, Clone, FromRow)]
pub struct Job {
    pub id: JobId,
    pub user_id: UserId,
    pub frontend: Frontend,
    pub bot_id: Option<String>,
    pub capability: Capability,
    pub status: JobStatus,
    pub priority: i32,
    pub params: sqlx::types::Json<Value>,
    pub workflow_id: Option<String>,
    pub cost_tokens: Decimal,
    pub timeout_seconds: i32,
    pub worker_id: Option<WorkerId>,
    pub created_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub execution_time_seconds: Option<f64>,
    pub error: Option<sqlx::types::Json<ErrorDetail>>,
    pub metadata: sqlx::types::Json<Value>,
}

impl Job {
    /// `retry_count` is carried in `metadata` per spec.md §3.
    pub fn retry_count(&self) -> u32 {
        self.metadata
            .0
            .get("retry_count")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32
    }
}

pub struct NewJob<'a> {
    pub user_id: UserId,
    pub frontend: Frontend,
    pub bot_id: Option<&'a str>,
    pub capability: Capability,
    pub priority: i32,
    pub params: Value,
    pub workflow_id: Option<&'a str>,
    pub cost_tokens: Decimal,
    pub timeout_seconds: i32,
    pub metadata: Value,
}

/// Insert a job in CREATED state, then immediately advance it to QUEUED
/// within the same admission transaction (spec.md §4.1, §4.2 step 8).
pub async fn insert_and_queue(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    new_job: NewJob<'_>,
) -> Result<Job> {
    let id = JobId::new();
    let job = sqlx::query_as::<_, Job>(
        r#"
        INSERT INTO jobs (
            id, user_id, frontend, bot_id, capability, status, priority,
            params, workflow_id, cost_tokens, timeout_seconds, metadata,
            queued_at
        )
        VALUES ($1, $2, $3, $4, $5, 'QUEUED', $6, $7, $8, $9, $10, $11, now())
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(new_job.user_id)
    .bind(new_job.frontend)
    .bind(new_job.bot_id)
    .bind(new_job.capability)
    .bind(new_job.priority)
    .bind(sqlx::types::Json(new_job.params))
    .bind(new_job.workflow_id)
    .bind(new_job.cost_tokens)
    .bind(new_job.timeout_seconds)
    .bind(sqlx::types::Json(new_job.metadata))
    .fetch_one(&mut **tx)
    .await?;
    Ok(job)
}

pub async fn get(pool: &Pool, id: JobId) -> Result<Option<Job>> {
    crate::retry::with_retry(|| async {
        Ok(sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?)
    })
    .await
}

/// Count of the user's non-terminal jobs, for the admission concurrency
/// check (spec.md §4.2 step 4).
pub async fn count_non_terminal_for_user(pool: &Pool, user_id: UserId) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM jobs WHERE user_id = $1 AND status IN ('CREATED', 'QUEUED', 'RUNNING')",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Count used to compute `queue_position` (spec.md §4.2 step 9): QUEUED
/// jobs with equal-or-higher priority that were queued first, or with
/// strictly higher priority regardless of time.
pub async fn queue_position(pool: &Pool, priority: i32, queued_at: DateTime<Utc>) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM jobs
        WHERE status = 'QUEUED'
          AND priority >= $1
          AND (priority > $1 OR queued_at < $2)
        "#,
    )
    .bind(priority)
    .bind(queued_at)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Fetch QUEUED job candidates for one dispatcher tick, already sorted by
/// the tie-break order of spec.md §4.3 (priority desc, queued_at asc, id
/// asc). The in-memory affinity pass re-orders within this candidate set;
/// SQL alone can't express "prefer a loaded model" so it isn't asked to.
pub async fn fetch_queued_candidates(pool: &Pool, limit: i64) -> Result<Vec<Job>> {
    crate::retry::with_retry(|| async {
        Ok(sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            WHERE status = 'QUEUED'
            ORDER BY priority DESC, queued_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await?)
    })
    .await
}

/// Atomically claim a QUEUED job for a worker. Returns `None` if another
/// dispatcher or a racing cancel already moved the job off QUEUED.
pub async fn claim_for_worker(pool: &Pool, job_id: JobId, worker_id: WorkerId) -> Result<Option<Job>> {
    Ok(sqlx::query_as::<_, Job>(
        r#"
        UPDATE jobs
        SET status = 'RUNNING', worker_id = $2, started_at = now()
        WHERE id = $1 AND status = 'QUEUED'
        RETURNING *
        "#,
    )
    .bind(job_id)
    .bind(worker_id)
    .fetch_optional(pool)
    .await?)
}

/// Transition a RUNNING job to COMPLETED (§4.4). No-op (returns `None`) if
/// the job was cancelled out from under the worker in the meantime.
pub async fn complete(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    job_id: JobId,
    execution_time_seconds: f64,
) -> Result<Option<Job>> {
    Ok(sqlx::query_as::<_, Job>(
        r#"
        UPDATE jobs
        SET status = 'COMPLETED', ended_at = now(), execution_time_seconds = $2
        WHERE id = $1 AND status = 'RUNNING'
        RETURNING *
        "#,
    )
    .bind(job_id)
    .bind(execution_time_seconds)
    .fetch_optional(&mut **tx)
    .await?)
}

/// Transition a RUNNING job to FAILED with a structured error (§4.4).
pub async fn fail(pool: &Pool, job_id: JobId, error: &ErrorDetail) -> Result<Option<Job>> {
    Ok(sqlx::query_as::<_, Job>(
        r#"
        UPDATE jobs
        SET status = 'FAILED', ended_at = now(), error = $2
        WHERE id = $1 AND status = 'RUNNING'
        RETURNING *
        "#,
    )
    .bind(job_id)
    .bind(sqlx::types::Json(error))
    .fetch_optional(pool)
    .await?)
}

/// Transition a RUNNING job to FAILED because its recoverable-failure
/// retry budget is exhausted, bumping `retry_count` one final time so the
/// record reflects the attempt count at the moment retries stopped
/// (spec.md §8 S5: "retry_count=2 — the job fails").
pub async fn fail_retries_exhausted(pool: &Pool, job_id: JobId, error: &ErrorDetail) -> Result<Option<Job>> {
    Ok(sqlx::query_as::<_, Job>(
        r#"
        UPDATE jobs
        SET status = 'FAILED', ended_at = now(), error = $2,
            metadata = jsonb_set(
                metadata,
                '{retry_count}',
                to_jsonb(COALESCE((metadata->>'retry_count')::int, 0) + 1)
            )
        WHERE id = $1 AND status = 'RUNNING'
        RETURNING *
        "#,
    )
    .bind(job_id)
    .bind(sqlx::types::Json(error))
    .fetch_optional(pool)
    .await?)
}

/// Requeue a RUNNING job after a recoverable failure, incrementing
/// `retry_count` and clearing the worker assignment (§4.1, §4.4, §4.5).
pub async fn requeue(pool: &Pool, job_id: JobId) -> Result<Option<Job>> {
    Ok(sqlx::query_as::<_, Job>(
        r#"
        UPDATE jobs
        SET status = 'QUEUED',
            worker_id = NULL,
            started_at = NULL,
            queued_at = now(),
            metadata = jsonb_set(
                metadata,
                '{retry_count}',
                to_jsonb(COALESCE((metadata->>'retry_count')::int, 0) + 1)
            )
        WHERE id = $1 AND status = 'RUNNING'
        RETURNING *
        "#,
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?)
}

/// Cancel a job in any non-terminal state (§5 "Cancellation"). QUEUED jobs
/// go straight to CANCELLED; RUNNING jobs do too (the abort to the worker
/// is best-effort and handled by the caller, not this query).
pub async fn cancel(pool: &Pool, job_id: JobId) -> Result<Option<Job>> {
    Ok(sqlx::query_as::<_, Job>(
        r#"
        UPDATE jobs
        SET status = 'CANCELLED', ended_at = now()
        WHERE id = $1 AND status IN ('CREATED', 'QUEUED', 'RUNNING')
        RETURNING *
        "#,
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?)
}

/// RUNNING jobs still attributed to a worker now considered dead (§4.5).
pub async fn running_for_worker(pool: &Pool, worker_id: WorkerId) -> Result<Vec<Job>> {
    Ok(sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE worker_id = $1 AND status = 'RUNNING'")
        .bind(worker_id)
        .fetch_all(pool)
        .await?)
}

/// RUNNING jobs whose `started_at + timeout_seconds + grace` has passed
/// (§4.5 reaper deadline sweep).
pub async fn running_past_deadline(pool: &Pool, grace_seconds: i32) -> Result<Vec<Job>> {
    Ok(sqlx::query_as::<_, Job>(
        r#"
        SELECT * FROM jobs
        WHERE status = 'RUNNING'
          AND started_at + (timeout_seconds + $1) * INTERVAL '1 second' < now()
        "#,
    )
    .bind(grace_seconds)
    .fetch_all(pool)
    .await?)
}

#[derive(Debug, Clone, Default)]
pub struct JobListFilter {
    pub status: Option<JobStatus>,
    pub capability: Option<Capability>,
    pub since: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

pub async fn list_for_user(pool: &Pool, user_id: UserId, filter: &JobListFilter) -> Result<Vec<Job>> {
    Ok(sqlx::query_as::<_, Job>(
        r#"
        SELECT * FROM jobs
        WHERE user_id = $1
          AND ($2::varchar IS NULL OR status = $2)
          AND ($3::varchar IS NULL OR capability = $3)
          AND ($4::timestamptz IS NULL OR created_at >= $4)
        ORDER BY created_at DESC
        LIMIT $5 OFFSET $6
        "#,
    )
    .bind(user_id)
    .bind(filter.status)
    .bind(filter.capability)
    .bind(filter.since)
    .bind(filter.limit)
    .bind(filter.offset)
    .fetch_all(pool)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_count_defaults_to_zero() {
        let job = Job {
            id: JobId::new(),
            user_id: UserId::new(),
            frontend: Frontend::Api,
            bot_id: None,
            capability: Capability::Image,
            status: JobStatus::Running,
            priority: 0,
            params: sqlx::types::Json(Value::Null),
            workflow_id: None,
            cost_tokens: Decimal::ZERO,
            timeout_seconds: 300,
            worker_id: None,
            created_at: Utc::now(),
            queued_at: None,
            started_at: None,
            ended_at: None,
            execution_time_seconds: None,
            error: None,
            metadata: sqlx::types::Json(serde_json::json!({})),
        };
        assert_eq!(job.retry_count(), 0);
    }
}
