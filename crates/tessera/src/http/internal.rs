//! Internal API (§6.2): the worker-facing surface. Workers post heartbeats
//! here; the outbound `/run_job`, `/health`, and `/capabilities` calls are
//! client-side concerns of the dispatcher and live in `tessera_core`.

use axum::extract::{ConnectInfo, Path, State};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use std::net::SocketAddr;
use tessera_ids::WorkerId;
use tessera_protocol::error::TesseraError;
use tessera_protocol::worker::{HeartbeatAck, HeartbeatPayload};

use crate::http::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/internal/heartbeat", post(heartbeat))
        .route("/api/internal/workers/:id/reinstate", post(reinstate))
}

/// A heartbeat's source *IP* plus its self-reported `callback_port` is how
/// the control plane learns where to reach a worker for `/run_job`; the
/// connection's source port is an ephemeral client port, not the worker's
/// listening one, so it can't be used directly (§4.5, §6.2).
async fn heartbeat(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<HeartbeatPayload>,
) -> impl IntoResponse {
    let base_url = format!("http://{}:{}", addr.ip(), payload.callback_port);
    state.registry.record_heartbeat(&payload);
    state.worker_base_urls.write().unwrap().insert(payload.worker_id, base_url);

    Json(HeartbeatAck {
        ack: true,
        dispatcher_version: state.dispatcher_version.to_string(),
    })
}

/// Clear a worker's quarantine after an operator-triggered health check
/// (§7: "human-operator health check").
async fn reinstate(
    State(state): State<AppState>,
    Path(id): Path<WorkerId>,
) -> Result<impl IntoResponse, ApiError> {
    if state.registry.reinstate(id) {
        Ok(Json(serde_json::json!({ "reinstated": true })))
    } else {
        Err(TesseraError::NotFound(format!("worker {id}")).into())
    }
}
