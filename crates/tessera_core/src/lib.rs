//! Tessera control-plane engine.
//!
//! Owns the admission pipeline, the dispatcher loop, the worker registry,
//! the completion handler, and the reaper: the four tightly coupled
//! subsystems spec.md calls "the core". The HTTP surface and webhook
//! delivery live one layer up, in the `tessera` binary crate.

pub mod admission;
pub mod completion;
pub mod cost;
pub mod dispatcher;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod reaper;
pub mod registry;
pub mod validation;

pub use admission::{AdmissionRequest, AdmissionResponse, AdmissionService};
pub use metrics::METRICS;
pub use rate_limit::RateLimiter;
pub use registry::WorkerRegistry;
