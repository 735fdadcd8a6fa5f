//! Admission service (spec.md §4.2): the synchronous handler that resolves
//! a user, enforces rate limit/concurrency/quota, validates parameters,
//! prices the request, and enqueues a job — all inside one storage
//! transaction that commits only if every step succeeds.

use chrono::Utc;
use rust_decimal::Decimal;
use tessera_db::jobs::NewJob;
use tessera_db::Pool;
use tessera_protocol::domain::{Capability, Frontend, JobStatus, Platform};
use tessera_protocol::error::TesseraError;
use tessera_protocol::job::params::{AudioParams, ImageParams, TextParams, VideoParams};

use crate::cost;
use crate::rate_limit::RateLimiter;
use crate::registry::WorkerRegistry;
use crate::validation;

pub struct AdmissionRequest {
    pub platform: Platform,
    pub platform_user_id: String,
    pub ip: Option<String>,
    pub frontend: Frontend,
    pub bot_id: Option<String>,
    pub capability: Capability,
    pub params: serde_json::Value,
    pub workflow_id: Option<String>,
    pub reply_context: Option<serde_json::Value>,
    pub webhook_url: Option<String>,
}

pub struct AdmissionResponse {
    pub job_id: tessera_ids::JobId,
    pub status: JobStatus,
    pub queue_position: i64,
    pub estimated_time_seconds: u32,
    pub cost_tokens: Decimal,
    pub created_at: chrono::DateTime<Utc>,
}

/// `cold_start_adjustment` (§4.2 step 10): 30s if no currently idle worker
/// reports the requested model loaded, else 5s.
fn cold_start_adjustment(registry: &WorkerRegistry, model: Option<&str>) -> u32 {
    let Some(model) = model else { return 30 };
    let resident = registry
        .idle_healthy_workers()
        .iter()
        .any(|w| w.loaded_models.iter().any(|m| m == model));
    if resident {
        5
    } else {
        30
    }
}

fn model_of(capability: Capability, params: &serde_json::Value) -> Option<String> {
    match capability {
        Capability::Image => params.get("model").and_then(|v| v.as_str()).map(String::from),
        Capability::Video => params.get("model").and_then(|v| v.as_str()).map(String::from),
        Capability::Text => params.get("model").and_then(|v| v.as_str()).map(String::from),
        Capability::Audio => None,
    }
}

/// Validate and price a request's params for its capability. Returns the
/// `(cost_tokens, timeout_seconds)` pair on success.
fn validate_and_price(
    capability: Capability,
    params: &serde_json::Value,
    plan: &tessera_db::plans::Plan,
) -> Result<(Decimal, i32), TesseraError> {
    match capability {
        Capability::Image => {
            let p: ImageParams = serde_json::from_value(params.clone())
                .map_err(|e| TesseraError::InvalidParams(e.to_string()))?;
            validation::validate_image(&p, plan)?;
            let cost = cost::image_cost(&p)
                .ok_or_else(|| TesseraError::InvalidParams("malformed resolution".into()))?;
            Ok((cost, p.timeout_seconds.unwrap_or(300) as i32))
        }
        Capability::Video => {
            let p: VideoParams = serde_json::from_value(params.clone())
                .map_err(|e| TesseraError::InvalidParams(e.to_string()))?;
            validation::validate_video(&p, plan)?;
            Ok((cost::video_cost(&p), p.timeout_seconds.unwrap_or(300) as i32))
        }
        Capability::Text => {
            let p: TextParams = serde_json::from_value(params.clone())
                .map_err(|e| TesseraError::InvalidParams(e.to_string()))?;
            validation::validate_text(&p, plan)?;
            Ok((cost::text_cost(&p), p.timeout_seconds.unwrap_or(300) as i32))
        }
        Capability::Audio => {
            let p: AudioParams = serde_json::from_value(params.clone())
                .map_err(|e| TesseraError::InvalidParams(e.to_string()))?;
            validation::validate_audio(&p, plan)?;
            Ok((cost::audio_cost(&p), p.timeout_seconds.unwrap_or(300) as i32))
        }
    }
}

pub struct AdmissionService<'a> {
    pool: &'a Pool,
    registry: &'a WorkerRegistry,
    rate_limiter: &'a RateLimiter,
}

impl<'a> AdmissionService<'a> {
    pub fn new(pool: &'a Pool, registry: &'a WorkerRegistry, rate_limiter: &'a RateLimiter) -> Self {
        Self {
            pool,
            registry,
            rate_limiter,
        }
    }

    pub async fn admit(&self, request: AdmissionRequest) -> Result<AdmissionResponse, TesseraError> {
        // Step 1: resolve user (insert-on-first-contact), outside the
        // pricing transaction since it only needs to happen once and the
        // upsert is itself atomic.
        let user = match tessera_db::users::find_by_platform_identity(
            self.pool,
            request.platform,
            &request.platform_user_id,
        )
        .await
        .map_err(db_err)?
        {
            Some(user) => {
                tessera_db::users::touch_last_active(self.pool, user.id, request.ip.as_deref())
                    .await
                    .map_err(db_err)?;
                user
            }
            None => tessera_db::users::insert_with_default_plan(
                self.pool,
                request.platform,
                &request.platform_user_id,
                request.ip.as_deref(),
            )
            .await
            .map_err(db_err)?,
        };

        // Step 2: load plan.
        let plan = tessera_db::plans::fetch(self.pool, user.plan_tier)
            .await
            .map_err(db_err)?;
        if !plan.active {
            return Err(TesseraError::InvalidParams("plan is inactive".into()));
        }

        // Step 3: rate-limit check.
        let rl = self
            .rate_limiter
            .check_and_record(user.id, plan.requests_per_minute as u32);
        if !rl.allowed {
            return Err(TesseraError::RateLimited {
                retry_after_seconds: rl.retry_after_seconds,
            });
        }

        // Step 4: concurrency check.
        let in_flight = tessera_db::jobs::count_non_terminal_for_user(self.pool, user.id)
            .await
            .map_err(db_err)?;
        if in_flight >= plan.max_concurrent_jobs as i64 {
            return Err(TesseraError::RateLimited { retry_after_seconds: 5 });
        }

        // Steps 5-6: validate params and price the request.
        let (cost_tokens, timeout_seconds) =
            validate_and_price(request.capability, &request.params, &plan)?;

        // Step 7: quota check against committed usage.
        let today = Utc::now().date_naive();
        let usage = tessera_db::daily_usage::fetch_for_date(self.pool, user.id, today)
            .await
            .map_err(db_err)?;
        if usage.tokens_used + cost_tokens > Decimal::from(plan.daily_token_limit) {
            return Err(TesseraError::QuotaExceeded(format!(
                "admitting this job would use {} of a {} token daily limit",
                usage.tokens_used + cost_tokens,
                plan.daily_token_limit
            )));
        }

        // Steps 8-10: insert + queue, then compute position/estimate. The
        // insert and its immediate CREATED->QUEUED advance happen in one
        // transaction (spec.md §4.1); position/estimate are read after
        // commit since they only need to observe the now-durable job.
        let mut metadata = serde_json::json!({ "retry_count": 0 });
        if let Some(reply_context) = request.reply_context {
            metadata["reply_context"] = reply_context;
        }
        if let Some(webhook_url) = &request.webhook_url {
            metadata["webhook_url"] = serde_json::Value::String(webhook_url.clone());
        }

        let mut tx = self.pool.begin().await.map_err(|e| TesseraError::Internal(e.to_string()))?;
        let job = tessera_db::jobs::insert_and_queue(
            &mut tx,
            NewJob {
                user_id: user.id,
                frontend: request.frontend,
                bot_id: request.bot_id.as_deref(),
                capability: request.capability,
                priority: plan.priority,
                params: request.params,
                workflow_id: request.workflow_id.as_deref(),
                cost_tokens,
                timeout_seconds,
                metadata,
            },
        )
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(|e| TesseraError::Internal(e.to_string()))?;

        let queued_at = job.queued_at.unwrap_or(job.created_at);
        let queue_position = tessera_db::jobs::queue_position(self.pool, job.priority, queued_at)
            .await
            .map_err(db_err)?;

        let model = model_of(request.capability, &job.params.0);
        let estimated_time_seconds = (queue_position as u32) * request.capability.avg_seconds()
            + cold_start_adjustment(self.registry, model.as_deref());

        Ok(AdmissionResponse {
            job_id: job.id,
            status: job.status,
            queue_position,
            estimated_time_seconds,
            cost_tokens: job.cost_tokens,
            created_at: job.created_at,
        })
    }
}

fn db_err(e: tessera_db::DbError) -> TesseraError {
    TesseraError::Internal(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cold_start_defaults_to_thirty_seconds_with_no_resident_model() {
        let registry = WorkerRegistry::new();
        assert_eq!(cold_start_adjustment(&registry, Some("sdxl")), 30);
    }
}
