//! Postgres persistence layer for the Tessera control plane.
//!
//! Five repository modules, one per entity in spec.md §3. Nothing upstream
//! of this crate is allowed to shadow canonical state with an in-process
//! cache — every read goes to Postgres.

pub mod artifacts;
pub mod daily_usage;
pub mod error;
pub mod jobs;
pub mod plans;
pub mod pool;
pub mod retry;
pub mod users;

pub use error::{DbError, Result};
pub use pool::{create_pool, DbConfig};

pub type Pool = sqlx::PgPool;
