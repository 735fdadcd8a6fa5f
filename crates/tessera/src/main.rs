//! Tessera control-plane binary: process wiring for the HTTP surface
//! (§6.1, §6.2), the dispatcher loop (§4.3), and the reaper sweep (§4.5).
//!
//! The binary's only job is assembly: every subsystem with actual logic
//! lives in `tessera_core` or `tessera_db`. `main` builds the shared
//! `AppState`, spawns the two background loops as long-lived tasks, and
//! serves the HTTP router until a shutdown signal arrives.

mod config;
mod state;
mod webhook;

pub mod http;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tessera_core::{RateLimiter, WorkerRegistry};
use tessera_db::{create_pool, DbConfig};
use tessera_logging::{init_logging, LogConfig};

use crate::config::Config;
use crate::state::AppState;
use crate::webhook::WebhookDispatcher;

/// Bumped whenever the dispatch protocol (the `/run_job` request/response
/// shape) changes, so a worker can log a mismatch instead of silently
/// misbehaving. Reported in every heartbeat ack (§6.2).
const DISPATCHER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    init_logging(LogConfig { json: config.log_json })?;

    tracing::info!(bind_addr = %config.bind_addr, "starting tessera control plane");

    let pool = create_pool(
        DbConfig::new(config.database_url.clone()).with_max_connections(config.db_max_connections),
    )
    .await?;

    let registry = Arc::new(WorkerRegistry::new());
    let rate_limiter = Arc::new(RateLimiter::new());
    // Dispatch calls override this per-request with job timeout + 10s
    // (up to 610s); this is the blanket ceiling for everything else that
    // goes through the shared client (webhook deliveries, worker reinstate).
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(630))
        .build()?;
    let webhook = Arc::new(WebhookDispatcher::new(http_client.clone(), pool.clone(), config.webhook_secret.clone()));

    let state = AppState {
        pool: pool.clone(),
        registry: registry.clone(),
        rate_limiter,
        webhook: webhook.clone(),
        http: http_client.clone(),
        worker_base_urls: Arc::new(RwLock::new(HashMap::new())),
        dispatcher_version: DISPATCHER_VERSION,
    };

    let dispatcher_handle = tokio::spawn(run_dispatcher_loop(
        pool.clone(),
        registry.clone(),
        http_client.clone(),
        state.worker_base_urls.clone(),
        webhook.clone(),
        Duration::from_secs(config.dispatch_interval_seconds),
    ));
    let reaper_handle = tokio::spawn(run_reaper_loop(
        pool.clone(),
        registry.clone(),
        webhook.clone(),
        Duration::from_secs(config.reaper_interval_seconds),
    ));

    let app = Router::new()
        .merge(http::public::router())
        .merge(http::internal::router())
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(bind_addr = %config.bind_addr, "http surface listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    dispatcher_handle.abort();
    reaper_handle.abort();
    Ok(())
}

/// The dispatcher is a single long-running coordination loop (§4.3, §5
/// "single-dispatcher invariant"): one tick, then sleep, forever. A tick
/// erroring out (e.g. a transient storage error) is logged and retried on
/// the next interval rather than crashing the process.
async fn run_dispatcher_loop(
    pool: tessera_db::Pool,
    registry: Arc<WorkerRegistry>,
    http_client: reqwest::Client,
    worker_base_urls: Arc<RwLock<HashMap<tessera_ids::WorkerId, String>>>,
    notifier: Arc<WebhookDispatcher>,
    interval: Duration,
) {
    let mut starvation_counts = HashMap::new();
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let urls = worker_base_urls.read().unwrap().clone();
        match tessera_core::dispatcher::tick(&pool, &registry, &http_client, &urls, &mut starvation_counts, notifier.clone()).await {
            Ok(0) => {}
            Ok(n) => tracing::debug!(dispatched = n, "dispatcher tick"),
            Err(err) => tracing::warn!(%err, "dispatcher tick failed"),
        }
    }
}

/// The reaper runs every `REAPER_INTERVAL_SECONDS` (default 10s, §4.5):
/// requeue jobs held by dead workers, fail jobs past their deadline, and
/// sweep forensic worker entries whose retention window elapsed.
async fn run_reaper_loop(
    pool: tessera_db::Pool,
    registry: Arc<WorkerRegistry>,
    notifier: Arc<WebhookDispatcher>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match tessera_core::reaper::tick(&pool, &registry, notifier.as_ref()).await {
            Ok((requeued, timed_out)) => {
                if requeued > 0 || timed_out > 0 {
                    tracing::info!(requeued, timed_out, "reaper swept jobs");
                }
            }
            Err(err) => tracing::warn!(%err, "reaper tick failed"),
        }
    }
}

async fn metrics() -> String {
    tessera_core::METRICS.prometheus_format()
}

async fn healthz() -> &'static str {
    "ok"
}

/// Waits for SIGINT or (on unix) SIGTERM so `docker stop`/`kubectl delete`
/// drain the listener instead of dropping in-flight requests.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining in-flight requests");
}
