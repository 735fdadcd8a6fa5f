//! Internal API DTOs: the heartbeat protocol and the outbound dispatch
//! protocol spoken between the control plane and worker processes.

use serde::{Deserialize, Serialize};
use tessera_ids::{JobId, WorkerId};

use crate::domain::Capability;
use crate::error::ErrorCode;

/// Liveness state a worker occupies in the registry. Distinct from the
/// worker-reported `busy`/`idle` status: this is the control plane's own
/// classification of heartbeat recency (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Healthy,
    Stale,
    Dead,
}

/// Self-reported busy/idle state carried in every heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Busy,
}

/// Body of `POST /api/internal/heartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub worker_id: WorkerId,
    pub status: WorkerStatus,
    pub capabilities: Vec<Capability>,
    pub loaded_models: Vec<String>,
    pub gpu_memory_used: Option<u64>,
    pub uptime_seconds: u64,
    pub jobs_completed: u64,
    /// Port the worker's own HTTP server listens on for `/run_job`,
    /// `/health`, `/capabilities`. Combined with the heartbeat's source IP
    /// to build the dispatch base URL, since the heartbeat connection's
    /// source *port* is an ephemeral client port, not this one.
    pub callback_port: u16,
}

/// Response to a heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatAck {
    pub ack: bool,
    pub dispatcher_version: String,
}

/// Body the control plane posts to a worker's `/run_job`. A batch is
/// represented as `jobs.len() > 1`; all members share a batch key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunJobRequest {
    pub jobs: Vec<RunJobMember>,
    pub timeout_seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunJobMember {
    pub job_id: JobId,
    pub engine: String,
    pub workflow_id: Option<String>,
    pub model_id: String,
    pub params: serde_json::Value,
}

/// Per-member outcome reported back by a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunJobOutcome {
    Completed {
        job_id: JobId,
        execution_time_seconds: f64,
        artifacts: Vec<ReportedArtifact>,
    },
    Failed {
        job_id: JobId,
        error: WorkerError,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerError {
    pub code: ErrorCode,
    pub message: String,
}

/// Response body from a worker's `/run_job` call. One entry per batch
/// member; a single-job dispatch returns a one-element vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunJobResponse {
    pub results: Vec<RunJobOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportedArtifact {
    #[serde(rename = "type")]
    pub artifact_type: crate::domain::ArtifactType,
    pub format: String,
    pub path: Option<String>,
    pub url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_seconds: Option<f64>,
    pub file_size_bytes: Option<i64>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Response from a worker's `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHealthResponse {
    pub status: WorkerStatus,
    pub uptime_seconds: u64,
}

/// Response from a worker's `GET /capabilities`, used at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerCapabilitiesResponse {
    pub capabilities: Vec<Capability>,
    pub loaded_models: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_job_outcome_tags_by_status() {
        let raw = serde_json::json!({
            "status": "failed",
            "job_id": tessera_ids::JobId::new().to_string(),
            "error": {"code": "WORKER_ERROR", "message": "cuda oom"},
        });
        let outcome: RunJobOutcome = serde_json::from_value(raw).unwrap();
        match outcome {
            RunJobOutcome::Failed { error, .. } => assert_eq!(error.code, ErrorCode::WorkerError),
            RunJobOutcome::Completed { .. } => panic!("expected Failed variant"),
        }
    }

    #[test]
    fn heartbeat_payload_round_trips() {
        let payload = HeartbeatPayload {
            worker_id: WorkerId::new(),
            status: WorkerStatus::Idle,
            capabilities: vec![Capability::Image],
            loaded_models: vec!["sdxl".to_string()],
            gpu_memory_used: Some(1024),
            uptime_seconds: 60,
            jobs_completed: 3,
            callback_port: 9000,
        };
        let json = serde_json::to_string(&payload).unwrap();
        let parsed: HeartbeatPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.worker_id, payload.worker_id);
        assert_eq!(parsed.status, WorkerStatus::Idle);
    }
}
