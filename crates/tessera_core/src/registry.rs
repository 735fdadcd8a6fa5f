//! Worker registry (spec.md §4.5): an in-memory map of known workers,
//! keyed by worker id, tracking liveness from heartbeat recency.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tessera_ids::WorkerId;
use tessera_protocol::domain::Capability;
use tessera_protocol::worker::{HeartbeatPayload, Liveness, WorkerStatus};

const HEALTHY_MAX: Duration = Duration::from_secs(60);
const STALE_MAX: Duration = Duration::from_secs(180);
/// How long a dead worker's entry is kept around for forensic visibility
/// after its jobs have been requeued (§4.5).
const DEAD_RETENTION: Duration = Duration::from_secs(600);
/// Failures within this window trigger quarantine (§7).
const QUARANTINE_WINDOW: Duration = Duration::from_secs(600);
const QUARANTINE_THRESHOLD: u32 = 3;

#[derive(Debug, Clone)]
pub struct WorkerEntry {
    pub worker_id: WorkerId,
    pub status: WorkerStatus,
    pub capabilities: Vec<Capability>,
    pub loaded_models: Vec<String>,
    pub gpu_memory_used: Option<u64>,
    pub uptime_seconds: u64,
    pub jobs_completed: u64,
    pub last_heartbeat: Instant,
    pub dead_since: Option<Instant>,
    pub quarantined: bool,
    recent_failures: Vec<Instant>,
}

impl WorkerEntry {
    fn new(payload: &HeartbeatPayload, now: Instant) -> Self {
        Self {
            worker_id: payload.worker_id,
            status: payload.status,
            capabilities: payload.capabilities.clone(),
            loaded_models: payload.loaded_models.clone(),
            gpu_memory_used: payload.gpu_memory_used,
            uptime_seconds: payload.uptime_seconds,
            jobs_completed: payload.jobs_completed,
            last_heartbeat: now,
            dead_since: None,
            quarantined: false,
            recent_failures: Vec::new(),
        }
    }

    pub fn liveness(&self, now: Instant) -> Liveness {
        let age = now.duration_since(self.last_heartbeat);
        if age <= HEALTHY_MAX {
            Liveness::Healthy
        } else if age <= STALE_MAX {
            Liveness::Stale
        } else {
            Liveness::Dead
        }
    }

    pub fn is_idle_and_dispatchable(&self, now: Instant) -> bool {
        matches!(self.status, WorkerStatus::Idle)
            && self.liveness(now) == Liveness::Healthy
            && !self.quarantined
    }
}

/// In-memory worker map, `RwLock`-guarded as a single fine-grained critical
/// section per spec.md §5 ("per-key locks with fine-grained critical
/// sections").
#[derive(Default)]
pub struct WorkerRegistry {
    workers: RwLock<HashMap<WorkerId, WorkerEntry>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert on heartbeat (§4.5). Re-delivering an identical heartbeat
    /// leaves the registry state equivalent (spec.md §8 idempotence law).
    pub fn record_heartbeat(&self, payload: &HeartbeatPayload) {
        let now = Instant::now();
        let mut workers = self.workers.write().unwrap();
        workers
            .entry(payload.worker_id)
            .and_modify(|entry| {
                entry.status = payload.status;
                entry.capabilities = payload.capabilities.clone();
                entry.loaded_models = payload.loaded_models.clone();
                entry.gpu_memory_used = payload.gpu_memory_used;
                entry.uptime_seconds = payload.uptime_seconds;
                entry.jobs_completed = payload.jobs_completed;
                entry.last_heartbeat = now;
                entry.dead_since = None;
            })
            .or_insert_with(|| WorkerEntry::new(payload, now));
    }

    pub fn get(&self, worker_id: WorkerId) -> Option<WorkerEntry> {
        self.workers.read().unwrap().get(&worker_id).cloned()
    }

    /// Idle, healthy workers whose capabilities intersect at least one
    /// requested capability, in deterministic (worker id) order for the
    /// dispatcher's worker-selection pass (§4.3 step 1).
    pub fn idle_healthy_workers(&self) -> Vec<WorkerEntry> {
        let now = Instant::now();
        let mut workers: Vec<_> = self
            .workers
            .read()
            .unwrap()
            .values()
            .filter(|w| w.is_idle_and_dispatchable(now))
            .cloned()
            .collect();
        workers.sort_by_key(|w| w.worker_id.to_string());
        workers
    }

    /// Workers whose last heartbeat is stale enough to be `dead`, and whose
    /// entry hasn't yet been swept (§4.5 reaper).
    pub fn newly_dead_workers(&self) -> Vec<WorkerId> {
        let now = Instant::now();
        self.workers
            .read()
            .unwrap()
            .values()
            .filter(|w| w.liveness(now) == Liveness::Dead && w.dead_since.is_none())
            .map(|w| w.worker_id)
            .collect()
    }

    pub fn mark_dead(&self, worker_id: WorkerId) {
        let now = Instant::now();
        if let Some(entry) = self.workers.write().unwrap().get_mut(&worker_id) {
            entry.dead_since = Some(now);
            entry.status = WorkerStatus::Idle;
        }
    }

    /// Drop forensic entries whose retention window has elapsed.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.workers.write().unwrap().retain(|_, entry| {
            entry
                .dead_since
                .map(|since| now.duration_since(since) < DEAD_RETENTION)
                .unwrap_or(true)
        });
    }

    /// Record a worker failure (`OOM`/`WORKER_ERROR`) and quarantine it if
    /// it has failed more than `QUARANTINE_THRESHOLD` times within
    /// `QUARANTINE_WINDOW` (§7).
    pub fn record_failure(&self, worker_id: WorkerId) {
        let now = Instant::now();
        if let Some(entry) = self.workers.write().unwrap().get_mut(&worker_id) {
            entry.recent_failures.retain(|t| now.duration_since(*t) < QUARANTINE_WINDOW);
            entry.recent_failures.push(now);
            if entry.recent_failures.len() > QUARANTINE_THRESHOLD as usize {
                entry.quarantined = true;
            }
        }
    }

    /// Clear quarantine after an operator-triggered health check succeeds
    /// (§7, `POST /api/internal/workers/{id}/reinstate`).
    pub fn reinstate(&self, worker_id: WorkerId) -> bool {
        if let Some(entry) = self.workers.write().unwrap().get_mut(&worker_id) {
            entry.quarantined = false;
            entry.recent_failures.clear();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(worker_id: WorkerId) -> HeartbeatPayload {
        HeartbeatPayload {
            worker_id,
            status: WorkerStatus::Idle,
            capabilities: vec![Capability::Image],
            loaded_models: vec!["sdxl".into()],
            gpu_memory_used: Some(1024),
            uptime_seconds: 10,
            jobs_completed: 0,
            callback_port: 9000,
        }
    }

    #[test]
    fn fresh_heartbeat_is_healthy_and_dispatchable() {
        let registry = WorkerRegistry::new();
        let worker_id = WorkerId::new();
        registry.record_heartbeat(&payload(worker_id));
        let entries = registry.idle_healthy_workers();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].worker_id, worker_id);
    }

    #[test]
    fn fifty_nine_seconds_is_healthy_sixty_one_is_stale() {
        let mut entry = WorkerEntry::new(&payload(WorkerId::new()), Instant::now());
        entry.last_heartbeat = Instant::now() - Duration::from_secs(59);
        assert_eq!(entry.liveness(Instant::now()), Liveness::Healthy);

        entry.last_heartbeat = Instant::now() - Duration::from_secs(61);
        assert_eq!(entry.liveness(Instant::now()), Liveness::Stale);
    }

    #[test]
    fn one_hundred_eighty_one_seconds_is_dead() {
        let mut entry = WorkerEntry::new(&payload(WorkerId::new()), Instant::now());
        entry.last_heartbeat = Instant::now() - Duration::from_secs(181);
        assert_eq!(entry.liveness(Instant::now()), Liveness::Dead);
    }

    #[test]
    fn quarantine_trips_after_threshold_failures() {
        let registry = WorkerRegistry::new();
        let worker_id = WorkerId::new();
        registry.record_heartbeat(&payload(worker_id));
        for _ in 0..4 {
            registry.record_failure(worker_id);
        }
        assert!(registry.get(worker_id).unwrap().quarantined);
        assert!(registry.idle_healthy_workers().is_empty());
    }

    #[test]
    fn reinstate_clears_quarantine() {
        let registry = WorkerRegistry::new();
        let worker_id = WorkerId::new();
        registry.record_heartbeat(&payload(worker_id));
        for _ in 0..4 {
            registry.record_failure(worker_id);
        }
        assert!(registry.reinstate(worker_id));
        assert!(!registry.get(worker_id).unwrap().quarantined);
    }
}
