//! Webhook delivery (spec.md §6.3): signs the completion payload with
//! HMAC-SHA256 over a shared secret and retries with exponential backoff.
//!
//! `sha2` alone (as the teacher's other binaries use it for content
//! hashing) isn't enough here — webhook receivers need a *keyed* MAC so a
//! third party can't forge a payload, hence the added `hmac` dependency
//! (see DESIGN.md).

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tessera_db::jobs::Job;
use tessera_db::Pool;
use tessera_protocol::job::{ArtifactView, JobStatusResponse};
use tessera_protocol::webhook::{WebhookData, WebhookEvent, WebhookPayload, SIGNATURE_HEADER};
use tessera_core::completion::WebhookNotifier;
use tessera_core::METRICS;

type HmacSha256 = Hmac<Sha256>;

fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// The wait, in seconds, before each of the 5 delivery attempts (spec.md
/// §6.3: "up to 5 attempts with exponential backoff (1,2,4,8,16 s), then
/// drop"). One array entry per attempt, not per gap between attempts.
const BACKOFF_SECONDS: [u64; 5] = [1, 2, 4, 8, 16];

pub struct WebhookDispatcher {
    client: reqwest::Client,
    pool: Pool,
    secret: String,
}

impl WebhookDispatcher {
    pub fn new(client: reqwest::Client, pool: Pool, secret: String) -> Self {
        Self { client, pool, secret }
    }

    fn sign(&self, body: &[u8]) -> String {
        sign(&self.secret, body)
    }

    async fn build_payload(&self, event: WebhookEvent, job: &Job) -> anyhow::Result<Vec<u8>> {
        let artifacts = tessera_db::artifacts::list_for_job(&self.pool, job.id)
            .await?
            .into_iter()
            .map(|a| ArtifactView {
                artifact_id: a.id,
                artifact_type: a.artifact_type,
                format: a.format,
                url: a.url,
                width: a.width.map(|w| w as u32),
                height: a.height.map(|h| h as u32),
                duration_seconds: a.duration_seconds,
                file_size_bytes: a.file_size_bytes,
            })
            .collect::<Vec<_>>();

        let status_response = JobStatusResponse {
            job_id: job.id,
            status: job.status,
            capability: job.capability,
            cost_tokens: job.cost_tokens,
            priority: job.priority,
            worker_id: job.worker_id,
            created_at: job.created_at,
            queued_at: job.queued_at,
            started_at: job.started_at,
            ended_at: job.ended_at,
            execution_time_seconds: job.execution_time_seconds,
            artifacts: Some(artifacts.clone()),
            error: job.error.as_ref().map(|e| e.0.clone()),
        };

        let payload = WebhookPayload {
            event,
            job_id: job.id,
            status: job.status,
            timestamp: chrono::Utc::now(),
            data: WebhookData {
                job: status_response,
                artifacts,
            },
        };
        Ok(serde_json::to_vec(&payload)?)
    }

    /// Deliver one webhook, retrying with the fixed backoff schedule.
    /// Never returns an error: the caller is a spawned fire-and-forget
    /// task, and exhausting retries is logged and counted, not propagated.
    async fn deliver(&self, url: String, event: WebhookEvent, job: Job) {
        let body = match self.build_payload(event, &job).await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(%err, job_id = %job.id, "failed to build webhook payload");
                return;
            }
        };
        let signature = format!("sha256={}", self.sign(&body));

        for (attempt, delay) in BACKOFF_SECONDS.into_iter().enumerate() {
            tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
            let result = self
                .client
                .post(&url)
                .header("content-type", "application/json")
                .header(SIGNATURE_HEADER, &signature)
                .body(body.clone())
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    METRICS.inc_webhooks_delivered();
                    return;
                }
                Ok(response) => {
                    tracing::debug!(job_id = %job.id, status = %response.status(), attempt, "webhook delivery rejected");
                }
                Err(err) => {
                    tracing::debug!(%err, job_id = %job.id, attempt, "webhook delivery failed");
                }
            }
        }

        tracing::warn!(job_id = %job.id, %url, "webhook delivery exhausted retries, dropping");
        METRICS.inc_webhooks_dropped();
    }
}

impl WebhookNotifier for WebhookDispatcher {
    fn notify(&self, webhook_url: String, event: WebhookEvent, job: Job) {
        let client = self.client.clone();
        let pool = self.pool.clone();
        let secret = self.secret.clone();
        tokio::spawn(async move {
            let dispatcher = WebhookDispatcher { client, pool, secret };
            dispatcher.deliver(webhook_url, event, job).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_for_a_fixed_key_and_body() {
        let sig_a = sign("shared-secret", b"{\"event\":\"job.completed\"}");
        let sig_b = sign("shared-secret", b"{\"event\":\"job.completed\"}");
        assert_eq!(sig_a, sig_b);
        assert_eq!(sig_a.len(), 64, "hex-encoded sha256 digest is 64 chars");
    }

    #[test]
    fn different_keys_produce_different_signatures() {
        let body = b"{\"event\":\"job.completed\"}";
        assert_ne!(sign("key-a", body), sign("key-b", body));
    }
}
