//! Metrics module for observability.
//!
//! In-memory counters for monitoring control-plane health, exposed in
//! Prometheus exposition format for `GET /metrics` (SPEC_FULL.md ambient
//! stack).
//!
//! ## Design principles (data-oriented)
//! - Plain data structures, no OOP
//! - Lock-free atomics where possible
//! - Single writer, multiple readers pattern

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics instance - lock-free atomics for counters.
pub static METRICS: Metrics = Metrics::new();

/// Control-plane metrics - all fields are atomic for thread-safe access.
pub struct Metrics {
    // Admission counters (§4.2)
    pub jobs_admitted: AtomicU64,
    pub jobs_rejected_invalid_params: AtomicU64,
    pub jobs_rejected_quota: AtomicU64,
    pub jobs_rejected_rate_limited: AtomicU64,

    // Dispatcher counters (§4.3)
    pub jobs_dispatched: AtomicU64,
    pub dispatch_batches: AtomicU64,
    pub dispatch_affinity_hits: AtomicU64,

    // Completion counters (§4.4)
    pub jobs_completed: AtomicU64,
    pub jobs_failed: AtomicU64,
    pub jobs_requeued: AtomicU64,

    // Worker registry / reaper counters (§4.5, §7)
    pub workers_marked_dead: AtomicU64,
    pub workers_quarantined: AtomicU64,
    pub jobs_timed_out: AtomicU64,

    // Webhook counters (§6.3)
    pub webhooks_delivered: AtomicU64,
    pub webhooks_dropped: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            jobs_admitted: AtomicU64::new(0),
            jobs_rejected_invalid_params: AtomicU64::new(0),
            jobs_rejected_quota: AtomicU64::new(0),
            jobs_rejected_rate_limited: AtomicU64::new(0),
            jobs_dispatched: AtomicU64::new(0),
            dispatch_batches: AtomicU64::new(0),
            dispatch_affinity_hits: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            jobs_requeued: AtomicU64::new(0),
            workers_marked_dead: AtomicU64::new(0),
            workers_quarantined: AtomicU64::new(0),
            jobs_timed_out: AtomicU64::new(0),
            webhooks_delivered: AtomicU64::new(0),
            webhooks_dropped: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_jobs_admitted(&self) {
        self.jobs_admitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_rejected_invalid_params(&self) {
        self.jobs_rejected_invalid_params.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_rejected_quota(&self) {
        self.jobs_rejected_quota.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_rejected_rate_limited(&self) {
        self.jobs_rejected_rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_dispatched_by(&self, n: u64) {
        self.jobs_dispatched.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_dispatch_batches(&self) {
        self.dispatch_batches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_dispatch_affinity_hits(&self) {
        self.dispatch_affinity_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_requeued(&self) {
        self.jobs_requeued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_workers_marked_dead(&self) {
        self.workers_marked_dead.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_workers_quarantined(&self) {
        self.workers_quarantined.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_timed_out(&self) {
        self.jobs_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_webhooks_delivered(&self) {
        self.webhooks_delivered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_webhooks_dropped(&self) {
        self.webhooks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters for reading.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_admitted: self.jobs_admitted.load(Ordering::Relaxed),
            jobs_rejected_invalid_params: self.jobs_rejected_invalid_params.load(Ordering::Relaxed),
            jobs_rejected_quota: self.jobs_rejected_quota.load(Ordering::Relaxed),
            jobs_rejected_rate_limited: self.jobs_rejected_rate_limited.load(Ordering::Relaxed),
            jobs_dispatched: self.jobs_dispatched.load(Ordering::Relaxed),
            dispatch_batches: self.dispatch_batches.load(Ordering::Relaxed),
            dispatch_affinity_hits: self.dispatch_affinity_hits.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_requeued: self.jobs_requeued.load(Ordering::Relaxed),
            workers_marked_dead: self.workers_marked_dead.load(Ordering::Relaxed),
            workers_quarantined: self.workers_quarantined.load(Ordering::Relaxed),
            jobs_timed_out: self.jobs_timed_out.load(Ordering::Relaxed),
            webhooks_delivered: self.webhooks_delivered.load(Ordering::Relaxed),
            webhooks_dropped: self.webhooks_dropped.load(Ordering::Relaxed),
        }
    }

    /// Format as Prometheus exposition format.
    pub fn prometheus_format(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP tessera_jobs_admitted_total Total jobs admitted into the queue
# TYPE tessera_jobs_admitted_total counter
tessera_jobs_admitted_total {}

# HELP tessera_jobs_rejected_invalid_params_total Total admissions rejected for invalid params or prompt
# TYPE tessera_jobs_rejected_invalid_params_total counter
tessera_jobs_rejected_invalid_params_total {}

# HELP tessera_jobs_rejected_quota_total Total admissions rejected for quota exceeded
# TYPE tessera_jobs_rejected_quota_total counter
tessera_jobs_rejected_quota_total {}

# HELP tessera_jobs_rejected_rate_limited_total Total admissions rejected for rate limiting
# TYPE tessera_jobs_rejected_rate_limited_total counter
tessera_jobs_rejected_rate_limited_total {}

# HELP tessera_jobs_dispatched_total Total jobs transitioned to RUNNING
# TYPE tessera_jobs_dispatched_total counter
tessera_jobs_dispatched_total {}

# HELP tessera_dispatch_batches_total Total dispatch batches assembled
# TYPE tessera_dispatch_batches_total counter
tessera_dispatch_batches_total {}

# HELP tessera_dispatch_affinity_hits_total Total jobs dispatched via model-affinity match
# TYPE tessera_dispatch_affinity_hits_total counter
tessera_dispatch_affinity_hits_total {}

# HELP tessera_jobs_completed_total Total jobs completed successfully
# TYPE tessera_jobs_completed_total counter
tessera_jobs_completed_total {}

# HELP tessera_jobs_failed_total Total jobs that failed terminally
# TYPE tessera_jobs_failed_total counter
tessera_jobs_failed_total {}

# HELP tessera_jobs_requeued_total Total jobs requeued after a recoverable failure
# TYPE tessera_jobs_requeued_total counter
tessera_jobs_requeued_total {}

# HELP tessera_workers_marked_dead_total Total worker liveness transitions to dead
# TYPE tessera_workers_marked_dead_total counter
tessera_workers_marked_dead_total {}

# HELP tessera_workers_quarantined_total Total worker quarantine events
# TYPE tessera_workers_quarantined_total counter
tessera_workers_quarantined_total {}

# HELP tessera_jobs_timed_out_total Total jobs failed by the reaper's deadline sweep
# TYPE tessera_jobs_timed_out_total counter
tessera_jobs_timed_out_total {}

# HELP tessera_webhooks_delivered_total Total webhook deliveries that succeeded
# TYPE tessera_webhooks_delivered_total counter
tessera_webhooks_delivered_total {}

# HELP tessera_webhooks_dropped_total Total webhook deliveries dropped after exhausting retries
# TYPE tessera_webhooks_dropped_total counter
tessera_webhooks_dropped_total {}
"#,
            s.jobs_admitted,
            s.jobs_rejected_invalid_params,
            s.jobs_rejected_quota,
            s.jobs_rejected_rate_limited,
            s.jobs_dispatched,
            s.dispatch_batches,
            s.dispatch_affinity_hits,
            s.jobs_completed,
            s.jobs_failed,
            s.jobs_requeued,
            s.workers_marked_dead,
            s.workers_quarantined,
            s.jobs_timed_out,
            s.webhooks_delivered,
            s.webhooks_dropped,
        )
    }
}

/// Immutable snapshot of metrics for reading.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub jobs_admitted: u64,
    pub jobs_rejected_invalid_params: u64,
    pub jobs_rejected_quota: u64,
    pub jobs_rejected_rate_limited: u64,
    pub jobs_dispatched: u64,
    pub dispatch_batches: u64,
    pub dispatch_affinity_hits: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_requeued: u64,
    pub workers_marked_dead: u64,
    pub workers_quarantined: u64,
    pub jobs_timed_out: u64,
    pub webhooks_delivered: u64,
    pub webhooks_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_are_reflected_in_the_snapshot() {
        let metrics = Metrics::new();
        metrics.inc_jobs_admitted();
        metrics.inc_jobs_admitted();
        metrics.inc_jobs_completed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_admitted, 2);
        assert_eq!(snapshot.jobs_completed, 1);
    }

    #[test]
    fn prometheus_format_includes_counter_values() {
        let metrics = Metrics::new();
        metrics.inc_jobs_completed();
        let output = metrics.prometheus_format();
        assert!(output.contains("tessera_jobs_completed_total 1"));
    }
}
