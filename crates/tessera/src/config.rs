//! Process configuration, loaded from the environment (with an optional
//! `.env` file for local development) via `clap`'s `env` derive feature,
//! matching the binary's other Tessera-family wiring.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "tessera", about = "Tessera control-plane core")]
pub struct Config {
    /// Address the public and internal HTTP surfaces bind to.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Max Postgres pool connections.
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 20)]
    pub db_max_connections: u32,

    /// Shared secret used to sign outbound webhook deliveries.
    #[arg(long, env = "WEBHOOK_SECRET")]
    pub webhook_secret: String,

    /// Emit logs as newline-delimited JSON instead of human-readable text.
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,

    /// Dispatcher tick interval, in seconds.
    #[arg(long, env = "DISPATCH_INTERVAL_SECONDS", default_value_t = 2)]
    pub dispatch_interval_seconds: u64,

    /// Reaper sweep interval, in seconds.
    #[arg(long, env = "REAPER_INTERVAL_SECONDS", default_value_t = 10)]
    pub reaper_interval_seconds: u64,
}

impl Config {
    /// Load `.env` (if present) then parse from the process environment
    /// and argv. A missing `.env` file is not an error: production
    /// deployments set the environment directly.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Config::parse()
    }
}
