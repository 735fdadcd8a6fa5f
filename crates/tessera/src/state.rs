//! Shared application state handed to every axum handler.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use tessera_core::{RateLimiter, WorkerRegistry};
use tessera_db::Pool;
use tessera_ids::WorkerId;

use crate::webhook::WebhookDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub registry: Arc<WorkerRegistry>,
    pub rate_limiter: Arc<RateLimiter>,
    pub webhook: Arc<WebhookDispatcher>,
    pub http: reqwest::Client,
    /// `worker_id -> base url`, populated from each heartbeat's source
    /// address so the dispatcher knows where to send `/run_job` (spec.md
    /// §4.5, §6.2). Not part of the registry proper since it's routing
    /// metadata, not liveness state.
    pub worker_base_urls: Arc<RwLock<HashMap<WorkerId, String>>>,
    pub dispatcher_version: &'static str,
}
