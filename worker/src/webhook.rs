//! Signed webhook delivery on job terminal transitions. Never raises to the
//! caller: retries are internal and the final outcome is returned as a
//! `bool` and logged.

use std::time::Duration;

use hmac::{Hmac, Mac};
use metrics::counter;
use scraper_common::ssrf::PublicIpResolver;
use serde_json::{json, Value};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy)]
pub struct JobSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Dispatches HMAC-signed webhook POSTs with bounded retries.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    secret: String,
    default_url: Option<String>,
    max_retries: u32,
    backoff_base: f64,
}

impl WebhookDispatcher {
    pub fn new(
        secret: impl Into<String>,
        default_url: Option<String>,
        max_retries: u32,
        backoff_base: f64,
        request_timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .dns_resolver(std::sync::Arc::new(PublicIpResolver))
            .timeout(request_timeout)
            .build()
            .expect("webhook client config is static and valid");

        Self {
            client,
            secret: secret.into(),
            default_url,
            max_retries,
            backoff_base,
        }
    }

    /// Builds the deterministic (compact, sorted-key) JSON payload.
    /// `serde_json::Map` is backed by a `BTreeMap` by default (the
    /// `preserve_order` feature is not enabled anywhere in this workspace),
    /// so `json!` already yields sorted keys without extra sorting code.
    fn build_payload(
        job_id: &str,
        status: &str,
        results: Option<&[Value]>,
        summary: JobSummary,
        total_tasks: usize,
    ) -> Value {
        let results_value = if total_tasks <= 100 {
            json!(results.unwrap_or(&[]))
        } else {
            Value::Null
        };

        json!({
            "job_id": job_id,
            "status": status,
            "summary": {
                "total": summary.total,
                "completed": summary.completed,
                "failed": summary.failed,
            },
            "results": results_value,
        })
    }

    fn sign(&self, body: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Resolves the target URL (override, else the configured default),
    /// signs and POSTs the payload, retrying up to `max_retries` times with
    /// `backoff_base * 2^attempt` seconds between attempts. Returns `true`
    /// once a response with status < 400 is received; `false` once retries
    /// are exhausted or no URL is configured. Never returns an `Err`.
    #[allow(clippy::too_many_arguments)]
    pub async fn deliver(
        &self,
        override_url: Option<&str>,
        job_id: &str,
        status: &str,
        results: Option<&[Value]>,
        summary: JobSummary,
        total_tasks: usize,
    ) -> bool {
        let Some(url) = override_url
            .map(str::to_string)
            .or_else(|| self.default_url.clone())
        else {
            tracing::debug!(job_id, "no webhook URL configured, skipping delivery");
            let labels = [("outcome", "skipped")];
            counter!("webhook_deliveries_total", &labels).increment(1);
            return false;
        };

        let payload = Self::build_payload(job_id, status, results, summary, total_tasks);
        let body = serde_json::to_vec(&payload).expect("payload is always serializable");
        let signature = self.sign(&body);

        let mut attempt: u32 = 0;
        loop {
            let response = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .header("X-Webhook-Signature", &signature)
                .body(body.clone())
                .send()
                .await;

            match response {
                Ok(resp) if (resp.status().as_u16()) < 400 => {
                    tracing::info!(job_id, status, "webhook delivered");
                    let labels = [("outcome", "delivered")];
                    counter!("webhook_deliveries_total", &labels).increment(1);
                    return true;
                }
                Ok(resp) => {
                    tracing::warn!(job_id, attempt, status = resp.status().as_u16(), "webhook delivery returned an error status");
                }
                Err(err) => {
                    tracing::warn!(job_id, attempt, error = %err, "webhook delivery request failed");
                }
            }

            if attempt >= self.max_retries {
                tracing::error!(job_id, "webhook delivery exhausted retries");
                let labels = [("outcome", "failed")];
                counter!("webhook_deliveries_total", &labels).increment(1);
                return false;
            }
            counter!("webhook_delivery_retries_total").increment(1);
            let backoff = self.backoff_base * 2f64.powi(attempt as i32);
            tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_included_only_under_the_size_cutoff() {
        let results = vec![json!({"a": 1})];
        let small = WebhookDispatcher::build_payload(
            "job-1",
            "completed",
            Some(&results),
            JobSummary { total: 1, completed: 1, failed: 0 },
            1,
        );
        assert!(small["results"].is_array());

        let large = WebhookDispatcher::build_payload(
            "job-2",
            "completed",
            Some(&results),
            JobSummary { total: 150, completed: 150, failed: 0 },
            150,
        );
        assert!(large["results"].is_null());
    }

    #[test]
    fn payload_serializes_with_sorted_keys() {
        let payload = WebhookDispatcher::build_payload(
            "job-1",
            "completed",
            None,
            JobSummary { total: 1, completed: 1, failed: 0 },
            1,
        );
        let body = serde_json::to_string(&payload).unwrap();
        let job_id_pos = body.find("job_id").unwrap();
        let results_pos = body.find("results").unwrap();
        let status_pos = body.find("\"status\"").unwrap();
        let summary_pos = body.find("summary").unwrap();
        assert!(job_id_pos < results_pos);
        assert!(results_pos < status_pos);
        assert!(status_pos < summary_pos);
    }

    #[test]
    fn signature_matches_hmac_sha256_of_body() {
        let dispatcher = WebhookDispatcher::new(
            "test-secret",
            None,
            3,
            1.0,
            Duration::from_secs(5),
        );
        let body = br#"{"hello":"world"}"#;
        let signature = dispatcher.sign(body);

        let mut mac = HmacSha256::new_from_slice(b"test-secret").unwrap();
        mac.update(body);
        let expected = hex::encode(mac.finalize().into_bytes());
        assert_eq!(signature, expected);
    }
}
