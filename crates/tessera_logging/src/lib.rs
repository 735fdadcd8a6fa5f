//! Shared logging utilities for Tessera binaries.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "tessera=info,tessera_core=info,tessera_db=info,sqlx=warn";

/// Logging configuration shared by Tessera binaries.
pub struct LogConfig {
    /// Emit one JSON object per line instead of the human-readable format.
    /// Production deployments behind a log aggregator want this; local
    /// development usually doesn't.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { json: false }
    }
}

/// Initialize `tracing` with an `EnvFilter` (respecting `RUST_LOG`) writing
/// to stderr, either as human-readable text or newline-delimited JSON.
pub fn init_logging(config: LogConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true),
            )
            .init();
    }

    Ok(())
}
