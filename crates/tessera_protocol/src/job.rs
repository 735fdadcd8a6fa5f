//! Job creation, status, listing, and cancellation DTOs — the public
//! `/api/v1/jobs*` surface.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tessera_ids::{ArtifactId, JobId, WorkerId};

use crate::domain::{ArtifactType, Capability, Frontend, JobStatus};
use crate::error::ErrorDetail;

/// Request body for `POST /api/v1/jobs`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobRequest {
    pub frontend: Frontend,
    #[serde(default)]
    pub bot_id: Option<String>,
    pub capability: Capability,
    /// `params` is validated per-capability at admission; the shape is not
    /// fixed at this layer, see `crate::job::params`.
    pub params: serde_json::Value,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub reply_context: Option<serde_json::Value>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Successful response to `POST /api/v1/jobs` (HTTP 201).
#[derive(Debug, Clone, Serialize)]
pub struct JobCreateResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub queue_position: i64,
    pub estimated_time_seconds: u32,
    pub cost_tokens: Decimal,
    pub created_at: DateTime<Utc>,
}

/// An artifact as exposed to a frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactView {
    pub artifact_id: ArtifactId,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub format: String,
    pub url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_seconds: Option<f64>,
    pub file_size_bytes: Option<i64>,
}

/// Response to `GET /api/v1/jobs/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub capability: Capability,
    pub cost_tokens: Decimal,
    pub priority: i32,
    pub worker_id: Option<WorkerId>,
    pub created_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub execution_time_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<ArtifactView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

/// Response to `DELETE /api/v1/jobs/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Query parameters accepted by `GET /api/v1/jobs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobListQuery {
    pub status: Option<JobStatus>,
    pub capability: Option<Capability>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub since: Option<DateTime<Utc>>,
}

impl JobListQuery {
    /// Clamp `limit` to the published maximum of 100, defaulting to 50.
    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(50).min(100) as i64
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.unwrap_or(0) as i64
    }
}

/// Per-capability parameter shapes. These are deserialized from
/// `JobRequest::params` during admission-time validation rather than at
/// the HTTP boundary, since the shape depends on `capability`.
pub mod params {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ImageParams {
        pub prompt: String,
        pub resolution: String,
        pub steps: u32,
        pub model: String,
        #[serde(default)]
        pub timeout_seconds: Option<u32>,
    }

    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "lowercase")]
    pub enum VideoResolution {
        #[serde(rename = "480p")]
        P480,
        #[serde(rename = "720p")]
        P720,
        #[serde(rename = "1080p")]
        P1080,
    }

    impl VideoResolution {
        /// Resolution multiplier applied to the base cost formula.
        pub const fn cost_multiplier(self) -> f64 {
            match self {
                VideoResolution::P480 => 0.5,
                VideoResolution::P720 => 1.0,
                VideoResolution::P1080 => 2.0,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct VideoParams {
        pub prompt: String,
        pub duration: u32,
        pub fps: u32,
        pub resolution: VideoResolution,
        pub model: String,
        #[serde(default)]
        pub timeout_seconds: Option<u32>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct TextParams {
        pub prompt: String,
        pub max_tokens: u32,
        pub model: String,
        #[serde(default)]
        pub timeout_seconds: Option<u32>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AudioParams {
        pub text: String,
        pub voice_id: String,
        pub duration: f64,
        #[serde(default)]
        pub timeout_seconds: Option<u32>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_clamps_limit_to_one_hundred() {
        let q = JobListQuery {
            limit: Some(500),
            ..Default::default()
        };
        assert_eq!(q.effective_limit(), 100);
    }

    #[test]
    fn list_query_defaults_limit_to_fifty() {
        let q = JobListQuery::default();
        assert_eq!(q.effective_limit(), 50);
        assert_eq!(q.effective_offset(), 0);
    }

    #[test]
    fn job_request_deserializes_from_json() {
        let raw = serde_json::json!({
            "frontend": "api",
            "capability": "image",
            "params": {"prompt": "a sunset", "resolution": "1024x1024", "steps": 20, "model": "sdxl"},
        });
        let req: JobRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(req.capability, Capability::Image);
        assert_eq!(req.frontend, Frontend::Api);
    }
}
