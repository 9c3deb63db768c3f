//! Workspace credential lookup against the backend, with a short-lived
//! in-process cache and bounded exponential-backoff retries.
//!
//! Security contract: a credential value must never be logged. Every log
//! statement in this module names the workspace/provider key, never the
//! fetched value.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use scraper_common::ssrf::PublicIpResolver;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential not found")]
    NotFound,
    #[error("credential backend request failed after retries")]
    Infrastructure,
}

#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    data: Value,
}

#[derive(Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// Fetches decrypted workspace credentials from the backend, caching each
/// `(workspace_id, provider)` pair for `cache_ttl`. Retries transport errors
/// and non-404 HTTP errors up to `max_retries` times with `2^attempt`-second
/// backoff; a 404 is surfaced immediately without retrying.
pub struct CredentialClient {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    cache_ttl: Duration,
    max_retries: u32,
    cache: Mutex<HashMap<(String, String), CacheEntry>>,
}

impl CredentialClient {
    pub fn new(
        base_url: impl Into<String>,
        service_key: impl Into<String>,
        cache_ttl_seconds: i64,
        max_retries: u32,
        request_timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .dns_resolver(std::sync::Arc::new(PublicIpResolver))
            .timeout(request_timeout)
            .build()
            .expect("credential client config is static and valid");

        Self {
            client,
            base_url: base_url.into(),
            service_key: service_key.into(),
            cache_ttl: Duration::from_secs(cache_ttl_seconds.max(0) as u64),
            max_retries,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_credential(
        &self,
        workspace_id: &str,
        provider: &str,
    ) -> Result<Value, CredentialError> {
        let key = (workspace_id.to_string(), provider.to_string());

        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(&key) {
                if entry.expires_at > Instant::now() {
                    return Ok(entry.value.clone());
                }
            }
        }

        let value = self.fetch_with_retry(workspace_id, provider).await?;

        let mut cache = self.cache.lock().await;
        cache.insert(
            key,
            CacheEntry {
                value: value.clone(),
                expires_at: Instant::now() + self.cache_ttl,
            },
        );
        Ok(value)
    }

    async fn fetch_with_retry(
        &self,
        workspace_id: &str,
        provider: &str,
    ) -> Result<Value, CredentialError> {
        let url = format!(
            "{}/workspaces/{workspace_id}/credentials/{provider}",
            self.base_url.trim_end_matches('/')
        );

        let mut attempt: u32 = 0;
        loop {
            let result = self
                .client
                .get(&url)
                .header("X-Service-Key", &self.service_key)
                .send()
                .await;

            match result {
                Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => {
                    tracing::info!(workspace_id, provider, "credential not found");
                    return Err(CredentialError::NotFound);
                }
                Ok(response) if response.status().is_success() => {
                    return Self::parse_body(response).await;
                }
                Ok(response) => {
                    tracing::warn!(
                        workspace_id,
                        provider,
                        status = response.status().as_u16(),
                        attempt,
                        "credential backend returned an error status"
                    );
                }
                Err(err) => {
                    tracing::warn!(workspace_id, provider, attempt, error = %err, "credential backend request failed");
                }
            }

            if attempt >= self.max_retries {
                return Err(CredentialError::Infrastructure);
            }
            tokio::time::sleep(Duration::from_secs_f64(2f64.powi(attempt as i32))).await;
            attempt += 1;
        }
    }

    async fn parse_body(response: reqwest::Response) -> Result<Value, CredentialError> {
        let body: Value = response
            .json()
            .await
            .map_err(|_| CredentialError::Infrastructure)?;

        if let Ok(envelope) = serde_json::from_value::<Envelope>(body.clone()) {
            Ok(envelope.data)
        } else {
            Ok(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cache_key_is_scoped_by_workspace_and_provider() {
        let client = CredentialClient::new(
            "http://backend.invalid",
            "svc-key",
            300,
            0,
            Duration::from_secs(1),
        );
        let mut cache = client.cache.lock().await;
        cache.insert(
            ("w1".to_string(), "linkedin".to_string()),
            CacheEntry {
                value: serde_json::json!({"token": "abc"}),
                expires_at: Instant::now() + Duration::from_secs(60),
            },
        );
        drop(cache);

        let hit = client.get_credential("w1", "linkedin").await.unwrap();
        assert_eq!(hit, serde_json::json!({"token": "abc"}));
    }
}
