//! Dispatcher (spec.md §4.3): the periodic tick that pairs QUEUED jobs with
//! idle workers. Selection is worker-centric: idle workers are visited in
//! deterministic order and each one is matched to its own best job (its
//! loaded-model affinity pass first, then the plain priority/FIFO pass),
//! rather than each job hunting across workers for an affinity match. Job
//! selection and the claim itself go through the job repository's
//! atomic-CAS update so a racing cancel or a second dispatcher tick never
//! double-claims a job.

use chrono::{DateTime, Utc};
use std::time::Duration;

use tessera_db::jobs::Job;
use tessera_db::Pool;
use tessera_ids::WorkerId;
use tessera_protocol::domain::Capability;
use tessera_protocol::worker::RunJobRequest;

use crate::registry::{WorkerEntry, WorkerRegistry};

/// How many QUEUED candidates to pull and consider per tick. Generous
/// relative to `MAX_BATCH_SIZE` so the affinity pass has enough to choose
/// from even when the front of the queue is dominated by one model.
const CANDIDATE_LIMIT: i64 = 200;
/// Jobs assembled into one batch dispatched to a single worker call
/// (spec.md §4.3 "batch assembly").
const MAX_BATCH_SIZE: usize = 4;
/// The number of times a job may be displaced by an equal-priority
/// affinity match before the anti-starvation rule forces it through ahead
/// of affinity regardless of loaded model (spec.md §4.3).
const AFFINITY_STARVATION_LIMIT: u32 = 10;

pub const TICK_INTERVAL: Duration = Duration::from_secs(2);

/// `batch_key` groups jobs that a single worker call can serve together
/// (spec.md §4.3): same capability, model, and generation parameters that
/// affect the underlying batched inference call.
fn batch_key(job: &Job) -> Option<String> {
    let p = &job.params.0;
    match job.capability {
        Capability::Image => Some(format!(
            "image:{}:{}:{}",
            p.get("model")?.as_str()?,
            p.get("resolution")?.as_str()?,
            p.get("steps")?
        )),
        Capability::Video => Some(format!(
            "video:{}:{}:{}:{}",
            p.get("model")?.as_str()?,
            p.get("resolution")?.as_str()?,
            p.get("fps")?,
            p.get("duration")?
        )),
        // Text and audio requests are never batched: each prompt/voice
        // pairing is distinct enough that batching wouldn't save work.
        Capability::Text | Capability::Audio => None,
    }
}

fn job_model(job: &Job) -> Option<&str> {
    job.params.0.get("model").and_then(|v| v.as_str())
}

/// `engine` identifier for the batch key and outbound dispatch payload.
/// Not a field any params shape carries explicitly; the capability name is
/// the closest stable analogue the protocol exposes.
fn engine_of(capability: Capability) -> &'static str {
    match capability {
        Capability::Image => "image",
        Capability::Video => "video",
        Capability::Text => "text",
        Capability::Audio => "audio",
    }
}

/// `model_id` to report to the worker. Audio jobs carry a `voice_id`
/// instead of a `model`.
fn model_id_of(job: &Job) -> String {
    job.params
        .0
        .get("model")
        .or_else(|| job.params.0.get("voice_id"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Sort key implementing the tie-break order of spec.md §4.3: priority
/// desc, then `queued_at` asc, then job id asc (lexicographic).
fn fifo_key(job: &Job) -> (std::cmp::Reverse<i32>, DateTime<Utc>, String) {
    (
        std::cmp::Reverse(job.priority),
        job.queued_at.unwrap_or(job.created_at),
        job.id.to_string(),
    )
}

/// A planned dispatch: one worker paired with a batch of jobs sharing a
/// `batch_key` (or a single job, if it has none).
pub struct DispatchPlan {
    pub worker_id: WorkerId,
    pub jobs: Vec<Job>,
}

/// Select which candidates to dispatch this tick without mutating any
/// state. Pure function over a candidate list and a worker snapshot so the
/// tie-break behavior (§4.3, §8) is directly unit-testable.
///
/// For each idle worker, in order: run the affinity pass (the
/// highest-priority QUEUED job, earliest-queued-first, whose model is
/// among the worker's `loaded_models`); if that differs from the plain
/// priority/FIFO pick at the *same* priority level, the affinity pick wins
/// unless the FIFO job has already been displaced this way
/// `AFFINITY_STARVATION_LIMIT` times, in which case the FIFO job wins and
/// its counter resets. A distinct affinity match can never be of strictly
/// higher priority than the FIFO pick (the FIFO pick is already the
/// highest-priority candidate available to this worker), so the
/// starvation exception — defined for equal-priority displacement only —
/// never needs to adjudicate a cross-priority case.
pub fn plan_dispatch(
    mut pending: Vec<Job>,
    idle: Vec<WorkerEntry>,
    starvation_counts: &mut std::collections::HashMap<tessera_ids::JobId, u32>,
) -> Vec<DispatchPlan> {
    let mut plans = Vec::new();

    for worker in &idle {
        if pending.is_empty() {
            break;
        }

        let Some(priority_job_id) = pending
            .iter()
            .filter(|j| worker.capabilities.contains(&j.capability))
            .min_by_key(|j| fifo_key(j))
            .map(|j| j.id)
        else {
            // No queued job this worker's capabilities can serve.
            continue;
        };
        let priority_job_priority = pending.iter().find(|j| j.id == priority_job_id).unwrap().priority;

        let affinity_job_id = pending
            .iter()
            .filter(|j| {
                worker.capabilities.contains(&j.capability)
                    && job_model(j)
                        .map(|model| worker.loaded_models.iter().any(|loaded| loaded == model))
                        .unwrap_or(false)
            })
            .min_by_key(|j| fifo_key(j))
            .map(|j| j.id);

        let chosen_id = match affinity_job_id {
            None => priority_job_id,
            Some(affinity_id) if affinity_id == priority_job_id => priority_job_id,
            Some(affinity_id) => {
                let affinity_priority = pending.iter().find(|j| j.id == affinity_id).unwrap().priority;
                if affinity_priority == priority_job_priority {
                    let count = starvation_counts.entry(priority_job_id).or_insert(0);
                    if *count >= AFFINITY_STARVATION_LIMIT {
                        priority_job_id
                    } else {
                        *count += 1;
                        affinity_id
                    }
                } else {
                    priority_job_id
                }
            }
        };
        starvation_counts.remove(&chosen_id);

        let idx = pending.iter().position(|j| j.id == chosen_id).expect("chosen job came from pending");
        let key = batch_key(&pending[idx]);
        let mut batch = vec![pending.remove(idx)];

        if let Some(key) = key {
            let mut j = 0;
            while batch.len() < MAX_BATCH_SIZE && j < pending.len() {
                if batch_key(&pending[j]).as_deref() == Some(key.as_str()) {
                    batch.push(pending.remove(j));
                } else {
                    j += 1;
                }
            }
        }

        plans.push(DispatchPlan {
            worker_id: worker.worker_id,
            jobs: batch,
        });
    }

    plans
}

/// One dispatcher tick: pull candidates, plan, atomically claim each job
/// for its assigned worker, and fire the outbound run-job call. Claim races
/// lost to a cancel or another dispatcher simply drop that job from its
/// batch (spec.md §5).
pub async fn tick(
    pool: &Pool,
    registry: &WorkerRegistry,
    http: &reqwest::Client,
    worker_base_urls: &std::collections::HashMap<WorkerId, String>,
    starvation_counts: &mut std::collections::HashMap<tessera_ids::JobId, u32>,
    notifier: std::sync::Arc<dyn crate::completion::WebhookNotifier>,
) -> Result<usize, tessera_db::DbError> {
    let candidates = tessera_db::jobs::fetch_queued_candidates(pool, CANDIDATE_LIMIT).await?;
    if candidates.is_empty() {
        return Ok(0);
    }
    let idle = registry.idle_healthy_workers();
    let plans = plan_dispatch(candidates, idle, starvation_counts);

    let mut dispatched = 0;
    for plan in plans {
        let mut claimed = Vec::with_capacity(plan.jobs.len());
        for job in &plan.jobs {
            if let Some(job) = tessera_db::jobs::claim_for_worker(pool, job.id, plan.worker_id).await? {
                claimed.push(job);
            }
        }
        if claimed.is_empty() {
            continue;
        }
        dispatched += claimed.len();

        let Some(base_url) = worker_base_urls.get(&plan.worker_id) else {
            tracing::warn!(worker_id = %plan.worker_id, "dispatch target has no known base url");
            continue;
        };
        let timeout_seconds = claimed.iter().map(|j| j.timeout_seconds).max().unwrap_or(300) as u32;
        let request = RunJobRequest {
            jobs: claimed
                .iter()
                .map(|j| tessera_protocol::worker::RunJobMember {
                    job_id: j.id,
                    engine: engine_of(j.capability).to_string(),
                    workflow_id: j.workflow_id.clone(),
                    model_id: model_id_of(j),
                    params: j.params.0.clone(),
                })
                .collect(),
            timeout_seconds,
        };
        let http = http.clone();
        let url = format!("{base_url}/run_job");
        let pool = pool.clone();
        let notifier = notifier.clone();
        let job_ids: Vec<tessera_ids::JobId> = claimed.iter().map(|j| j.id).collect();
        tokio::spawn(async move {
            // The worker call is synchronous: its HTTP response body *is*
            // the completion report for the whole batch (§6.2 — there is
            // no separate callback endpoint for run-job results).
            // Per-RPC dispatch timeout is job timeout + 10s (§5), not the
            // http client's blanket default: the longest job accepted by
            // validation (600s) would otherwise be cut off early.
            let rpc_timeout = Duration::from_secs(timeout_seconds as u64 + 10);
            let response = match http.post(&url).timeout(rpc_timeout).json(&request).send().await {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(%err, %url, "run-job dispatch call failed");
                    for job_id in job_ids {
                        if let Err(err) =
                            crate::completion::handle_dispatch_exception(&pool, notifier.as_ref(), job_id, err.to_string())
                                .await
                        {
                            tracing::error!(%err, %job_id, "failed to record dispatch exception");
                        }
                    }
                    return;
                }
            };
            let body: tessera_protocol::worker::RunJobResponse = match response.json().await {
                Ok(body) => body,
                Err(err) => {
                    tracing::warn!(%err, %url, "run-job response was not valid JSON");
                    return;
                }
            };
            for outcome in body.results {
                if let Err(err) = crate::completion::handle_outcome(&pool, notifier.as_ref(), outcome).await {
                    tracing::error!(%err, "failed to record run-job outcome");
                }
            }
        });
    }

    Ok(dispatched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use tessera_ids::{JobId, UserId};
    use tessera_protocol::domain::{Frontend, JobStatus};
    use tessera_protocol::worker::{HeartbeatPayload, WorkerStatus};

    fn job(priority: i32, capability: Capability, model: &str) -> Job {
        Job {
            id: JobId::new(),
            user_id: UserId::new(),
            frontend: Frontend::Api,
            bot_id: None,
            capability,
            status: JobStatus::Queued,
            priority,
            params: sqlx::types::Json(serde_json::json!({
                "model": model, "resolution": "1024x1024", "steps": 20,
            })),
            workflow_id: None,
            cost_tokens: Decimal::ONE,
            timeout_seconds: 300,
            worker_id: None,
            created_at: Utc::now(),
            queued_at: Some(Utc::now()),
            started_at: None,
            ended_at: None,
            execution_time_seconds: None,
            error: None,
            metadata: sqlx::types::Json(serde_json::json!({})),
        }
    }

    fn worker(id: WorkerId, models: &[&str]) -> WorkerEntry {
        let payload = HeartbeatPayload {
            worker_id: id,
            status: WorkerStatus::Idle,
            capabilities: vec![Capability::Image],
            loaded_models: models.iter().map(|s| s.to_string()).collect(),
            gpu_memory_used: None,
            uptime_seconds: 0,
            jobs_completed: 0,
            callback_port: 9000,
        };
        let registry = WorkerRegistry::new();
        registry.record_heartbeat(&payload);
        registry.idle_healthy_workers().into_iter().next().unwrap()
    }

    /// spec.md §8 S4: worker has `sdxl` loaded; queue holds J1 (priority 1,
    /// model flux-schnell, queued first) and J2 (priority 1, model sdxl,
    /// queued second). The dispatcher must select J2 — affinity overrides
    /// FIFO within equal priority — leaving J1's starvation counter at 1.
    #[test]
    fn s4_affinity_overrides_fifo_within_equal_priority() {
        let w = worker(WorkerId::new(), &["sdxl"]);
        let j1 = job(1, Capability::Image, "flux-schnell");
        std::thread::sleep(Duration::from_millis(2));
        let j2 = job(1, Capability::Image, "sdxl");
        let mut starvation = HashMap::new();

        let plans = plan_dispatch(vec![j1.clone(), j2.clone()], vec![w.clone()], &mut starvation);

        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].worker_id, w.worker_id);
        assert_eq!(plans[0].jobs.len(), 1);
        assert_eq!(plans[0].jobs[0].id, j2.id);
        assert_eq!(*starvation.get(&j1.id).unwrap(), 1);
    }

    /// A worker processes jobs it's equipped for; a job whose model no
    /// worker has loaded still goes through the plain priority/FIFO pass.
    #[test]
    fn no_affinity_match_falls_back_to_priority_pass() {
        let w = worker(WorkerId::new(), &["sdxl"]);
        let j = job(0, Capability::Image, "flux-schnell");
        let mut starvation = HashMap::new();

        let plans = plan_dispatch(vec![j.clone()], vec![w.clone()], &mut starvation);

        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].jobs[0].id, j.id);
    }

    /// spec.md §4.3 / §9: a non-affinity job displaced at equal priority at
    /// most `AFFINITY_STARVATION_LIMIT` times before it is preferred over
    /// affinity on the next opportunity, and its counter resets once it is
    /// finally dispatched.
    #[test]
    fn starvation_limit_forces_displaced_job_through_after_ten_skips() {
        let w = worker(WorkerId::new(), &["sdxl"]);
        let j1 = job(0, Capability::Image, "flux-schnell");
        let mut starvation = HashMap::new();

        for _ in 0..AFFINITY_STARVATION_LIMIT {
            std::thread::sleep(Duration::from_millis(1));
            let competing = job(0, Capability::Image, "sdxl");
            let plans = plan_dispatch(vec![j1.clone(), competing.clone()], vec![w.clone()], &mut starvation);
            assert_eq!(plans[0].jobs[0].id, competing.id, "affinity match wins while under the limit");
        }
        assert_eq!(*starvation.get(&j1.id).unwrap(), AFFINITY_STARVATION_LIMIT);

        std::thread::sleep(Duration::from_millis(1));
        let competing = job(0, Capability::Image, "sdxl");
        let plans = plan_dispatch(vec![j1.clone(), competing], vec![w], &mut starvation);
        assert_eq!(plans[0].jobs[0].id, j1.id, "limit reached: the displaced job wins this round");
        assert!(starvation.get(&j1.id).is_none(), "counter clears once the displaced job is dispatched");
    }

    #[test]
    fn jobs_sharing_a_batch_key_are_grouped_up_to_max_batch_size() {
        let w = worker(WorkerId::new(), &["sdxl"]);
        let jobs: Vec<Job> = (0..6).map(|_| job(0, Capability::Image, "sdxl")).collect();
        let mut starvation = HashMap::new();
        let plans = plan_dispatch(jobs, vec![w], &mut starvation);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].jobs.len(), MAX_BATCH_SIZE);
    }

    #[test]
    fn no_idle_worker_leaves_candidates_unplanned() {
        let jobs = vec![job(0, Capability::Image, "sdxl")];
        let mut starvation = HashMap::new();
        let plans = plan_dispatch(jobs, vec![], &mut starvation);
        assert!(plans.is_empty());
    }
}
