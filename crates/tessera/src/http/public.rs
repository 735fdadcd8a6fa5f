//! Public API (§6.1): the frontend-facing `/api/v1/*` surface.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use tessera_core::{AdmissionRequest, AdmissionService};
use tessera_ids::JobId;
use tessera_protocol::error::TesseraError;
use tessera_protocol::job::{
    ArtifactView, CancelResponse, JobCreateResponse, JobListQuery, JobRequest, JobStatusResponse,
};
use tessera_protocol::user::{
    CapabilityBreakdown, DailyUsageView, ModelInfo, ModelsResponse, UsageHistoryResponse, UserResponse,
};

use crate::http::auth::AuthedUser;
use crate::http::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/jobs", post(create_job).get(list_jobs))
        .route("/api/v1/jobs/:id", get(get_job).delete(cancel_job))
        .route("/api/v1/user/me", get(get_current_user))
        .route("/api/v1/user/usage", get(get_usage_history))
        .route("/api/v1/models", get(list_models))
}

/// Rate-limit headers owed on every response (§6.1). Looked up fresh
/// against the in-process limiter rather than carried through the
/// request, since multiple requests from the same user may interleave.
fn rate_limit_headers(state: &AppState, user_id: tessera_ids::UserId, limit: u32) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let result = state.rate_limiter.peek(user_id, limit);
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(result.remaining));
    let reset = (Utc::now().timestamp() + result.retry_after_seconds.max(1) as i64).max(0);
    headers.insert("X-RateLimit-Reset", HeaderValue::from(reset as u64));
    headers
}

async fn create_job(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Json(request): Json<JobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = AdmissionService::new(&state.pool, &state.registry, &state.rate_limiter);
    let response = service
        .admit(AdmissionRequest {
            platform: user.platform,
            platform_user_id: user.platform_user_id.clone(),
            ip: user.ip.clone(),
            frontend: request.frontend,
            bot_id: request.bot_id,
            capability: request.capability,
            params: request.params,
            workflow_id: request.workflow_id,
            reply_context: request.reply_context,
            webhook_url: request.webhook_url,
        })
        .await?;

    let plan = tessera_db::plans::fetch(&state.pool, user.plan_tier)
        .await
        .map_err(|e| TesseraError::Internal(e.to_string()))?;
    let headers = rate_limit_headers(&state, user.id, plan.requests_per_minute as u32);

    let body = JobCreateResponse {
        job_id: response.job_id,
        status: response.status,
        queue_position: response.queue_position,
        estimated_time_seconds: response.estimated_time_seconds,
        cost_tokens: response.cost_tokens,
        created_at: response.created_at,
    };
    Ok((StatusCode::CREATED, headers, Json(body)))
}

async fn get_job(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<JobId>,
) -> Result<impl IntoResponse, ApiError> {
    let job = tessera_db::jobs::get(&state.pool, id)
        .await
        .map_err(|e| TesseraError::Internal(e.to_string()))?
        .filter(|j| j.user_id == user.id)
        .ok_or_else(|| TesseraError::NotFound(format!("job {id}")))?;

    let artifacts = if job.status.is_terminal() {
        let rows = tessera_db::artifacts::list_for_job(&state.pool, job.id)
            .await
            .map_err(|e| TesseraError::Internal(e.to_string()))?;
        Some(
            rows.into_iter()
                .map(|a| ArtifactView {
                    artifact_id: a.id,
                    artifact_type: a.artifact_type,
                    format: a.format,
                    url: a.url,
                    width: a.width.map(|w| w as u32),
                    height: a.height.map(|h| h as u32),
                    duration_seconds: a.duration_seconds,
                    file_size_bytes: a.file_size_bytes,
                })
                .collect(),
        )
    } else {
        None
    };

    let headers = plan_rate_limit_headers(&state, &user).await?;
    Ok((
        headers,
        Json(JobStatusResponse {
            job_id: job.id,
            status: job.status,
            capability: job.capability,
            cost_tokens: job.cost_tokens,
            priority: job.priority,
            worker_id: job.worker_id,
            created_at: job.created_at,
            queued_at: job.queued_at,
            started_at: job.started_at,
            ended_at: job.ended_at,
            execution_time_seconds: job.execution_time_seconds,
            artifacts,
            error: job.error.map(|e| e.0),
        }),
    ))
}

async fn cancel_job(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<JobId>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = tessera_db::jobs::get(&state.pool, id)
        .await
        .map_err(|e| TesseraError::Internal(e.to_string()))?
        .filter(|j| j.user_id == user.id)
        .ok_or_else(|| TesseraError::NotFound(format!("job {id}")))?;

    let headers = plan_rate_limit_headers(&state, &user).await?;

    // Cancel of an already-terminal job is a no-op that returns the
    // existing terminal state with 200 (spec.md §8 idempotence law).
    if existing.status.is_terminal() {
        return Ok((
            headers,
            Json(CancelResponse {
                job_id: existing.id,
                status: existing.status,
            }),
        ));
    }

    let job = tessera_db::jobs::cancel(&state.pool, id)
        .await
        .map_err(|e| TesseraError::Internal(e.to_string()))?
        .unwrap_or(existing);

    Ok((
        headers,
        Json(CancelResponse {
            job_id: job.id,
            status: job.status,
        }),
    ))
}

async fn list_jobs(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Query(query): Query<JobListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = tessera_db::jobs::JobListFilter {
        status: query.status,
        capability: query.capability,
        since: query.since,
        limit: query.effective_limit(),
        offset: query.effective_offset(),
    };
    let jobs = tessera_db::jobs::list_for_user(&state.pool, user.id, &filter)
        .await
        .map_err(|e| TesseraError::Internal(e.to_string()))?;

    let responses: Vec<JobStatusResponse> = jobs
        .into_iter()
        .map(|job| JobStatusResponse {
            job_id: job.id,
            status: job.status,
            capability: job.capability,
            cost_tokens: job.cost_tokens,
            priority: job.priority,
            worker_id: job.worker_id,
            created_at: job.created_at,
            queued_at: job.queued_at,
            started_at: job.started_at,
            ended_at: job.ended_at,
            execution_time_seconds: job.execution_time_seconds,
            artifacts: None,
            error: job.error.map(|e| e.0),
        })
        .collect();

    let headers = plan_rate_limit_headers(&state, &user).await?;
    Ok((headers, Json(responses)))
}

async fn get_current_user(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
) -> Result<impl IntoResponse, ApiError> {
    let plan = tessera_db::plans::fetch(&state.pool, user.plan_tier)
        .await
        .map_err(|e| TesseraError::Internal(e.to_string()))?;
    let usage = tessera_db::daily_usage::fetch_for_date(&state.pool, user.id, Utc::now().date_naive())
        .await
        .map_err(|e| TesseraError::Internal(e.to_string()))?;

    let headers = rate_limit_headers(&state, user.id, plan.requests_per_minute as u32);
    Ok((
        headers,
        Json(UserResponse {
            user_id: user.id,
            platform: user.platform,
            plan: user.plan_tier,
            daily_token_limit: plan.daily_token_limit,
            tokens_used_today: usage.tokens_used,
            requests_per_minute: plan.requests_per_minute,
            max_concurrent_jobs: plan.max_concurrent_jobs,
            created_at: user.created_at,
            last_active_at: user.last_active_at,
        }),
    ))
}

async fn get_usage_history(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
) -> Result<impl IntoResponse, ApiError> {
    const HISTORY_DAYS: i64 = 30;
    let rows = tessera_db::daily_usage::history(&state.pool, user.id, HISTORY_DAYS)
        .await
        .map_err(|e| TesseraError::Internal(e.to_string()))?;

    let days = rows
        .into_iter()
        .map(|row| DailyUsageView {
            usage_date: row.usage_date,
            tokens_used: row.tokens_used,
            jobs_completed: row.jobs_completed,
            jobs_failed: row.jobs_failed,
            breakdown: CapabilityBreakdown {
                image: row.tokens_image,
                video: row.tokens_video,
                text: row.tokens_text,
                audio: row.tokens_audio,
            },
        })
        .collect();

    let headers = plan_rate_limit_headers(&state, &user).await?;
    Ok((headers, Json(UsageHistoryResponse { days })))
}

async fn list_models(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
) -> Result<impl IntoResponse, ApiError> {
    let models = tessera_core::models::KNOWN_MODELS
        .iter()
        .map(|(model_id, capability)| ModelInfo {
            model_id: model_id.to_string(),
            capability: *capability,
            // Residency is a registry concept, not modeled per-model here;
            // a future iteration could cross-reference `idle_healthy_workers`.
            resident: false,
        })
        .collect();
    let headers = plan_rate_limit_headers(&state, &user).await?;
    Ok((headers, Json(ModelsResponse { models })))
}

/// Fetch the user's plan and build rate-limit headers in one shot, for
/// handlers that don't already have the plan loaded for another reason.
async fn plan_rate_limit_headers(
    state: &AppState,
    user: &tessera_db::users::User,
) -> Result<HeaderMap, ApiError> {
    let plan = tessera_db::plans::fetch(&state.pool, user.plan_tier)
        .await
        .map_err(|e| TesseraError::Internal(e.to_string()))?;
    Ok(rate_limit_headers(state, user.id, plan.requests_per_minute as u32))
}
