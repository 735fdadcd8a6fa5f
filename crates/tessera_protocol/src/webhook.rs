//! Webhook delivery payloads (§6.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_ids::JobId;

use crate::domain::JobStatus;
use crate::job::{ArtifactView, JobStatusResponse};

/// Event name carried in a webhook payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEvent {
    JobCompleted,
    JobFailed,
    JobCancelled,
}

impl WebhookEvent {
    pub const fn for_status(status: JobStatus) -> Option<Self> {
        match status {
            JobStatus::Completed => Some(WebhookEvent::JobCompleted),
            JobStatus::Failed => Some(WebhookEvent::JobFailed),
            JobStatus::Cancelled => Some(WebhookEvent::JobCancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookData {
    pub job: JobStatusResponse,
    pub artifacts: Vec<ArtifactView>,
}

/// Body POSTed to a job's `webhook_url` on terminal completion.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub event: WebhookEvent,
    pub job_id: JobId,
    pub status: JobStatus,
    pub timestamp: DateTime<Utc>,
    pub data: WebhookData,
}

/// Header name the signature is carried under: `X-Tessera-Signature`.
pub const SIGNATURE_HEADER: &str = "X-Tessera-Signature";

/// Format the signature header value: `sha256=<hex hmac>`.
pub fn format_signature_header(hex_hmac: &str) -> String {
    format!("sha256={hex_hmac}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_maps_only_from_terminal_statuses() {
        assert_eq!(
            WebhookEvent::for_status(JobStatus::Completed),
            Some(WebhookEvent::JobCompleted)
        );
        assert_eq!(WebhookEvent::for_status(JobStatus::Queued), None);
        assert_eq!(WebhookEvent::for_status(JobStatus::Running), None);
    }

    #[test]
    fn signature_header_has_sha256_prefix() {
        assert_eq!(format_signature_header("abc123"), "sha256=abc123");
    }
}
