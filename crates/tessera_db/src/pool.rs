//! Postgres pool creation and embedded migrations.

use sqlx::postgres::{PgPoolOptions, PgPool};
use tracing::info;

use crate::error::Result;

/// Database configuration resolved from the binary's environment.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

/// Open a pool and run embedded migrations, so the process never serves
/// traffic against a schema it hasn't verified.
pub async fn create_pool(config: DbConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    info!(max_connections = config.max_connections, "connected to Postgres, schema verified");
    Ok(pool)
}
