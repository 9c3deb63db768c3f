//! Round-robin proxy selection with per-domain cooldown and a background
//! health-restoration loop. A single critical section guards the endpoint
//! table and the cursor so `select`, `mark_*`, and the health loop can never
//! race each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use scraper_common::ssrf::PublicIpResolver;
use tokio::sync::Mutex;
use url::Url;

use crate::ProxyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks5,
}

impl ProxyProtocol {
    fn from_scheme(scheme: &str) -> Self {
        match scheme {
            "https" => ProxyProtocol::Https,
            "socks5" | "socks5h" => ProxyProtocol::Socks5,
            _ => ProxyProtocol::Http,
        }
    }
}

/// One upstream proxy endpoint. `region` is an optional tag (e.g. `"US"`,
/// `"EU"`) consulted by the fingerprint randomizer to keep geolocation
/// consistent with the egress IP's apparent location.
#[derive(Debug, Clone)]
pub struct ProxyEndpoint {
    pub url: String,
    pub protocol: ProxyProtocol,
    pub region: Option<String>,
    healthy: bool,
    success_count: u64,
    failure_count: u64,
    last_used_domains: HashMap<String, Instant>,
}

impl ProxyEndpoint {
    /// Parses a proxy URL of the form `scheme://[user:pass@]host:port` or
    /// `scheme://host:port#region` (the fragment, if present, is read as the
    /// region tag and is not sent anywhere).
    pub fn parse(raw: &str) -> Option<Self> {
        let parsed = Url::parse(raw).ok()?;
        let protocol = ProxyProtocol::from_scheme(parsed.scheme());
        let region = parsed.fragment().map(str::to_string);
        Some(Self {
            url: raw.to_string(),
            protocol,
            region,
            healthy: true,
            success_count: 0,
            failure_count: 0,
            last_used_domains: HashMap::new(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProxyManagerStats {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
}

/// A proxy selected for a particular target domain.
#[derive(Debug, Clone)]
pub struct SelectedProxy {
    pub url: String,
    pub protocol: ProxyProtocol,
    pub region: Option<String>,
}

struct Inner {
    endpoints: Vec<ProxyEndpoint>,
}

/// Owns the proxy pool: ordered endpoint list, round-robin cursor, and
/// per-domain cooldown bookkeeping. `select`, `mark_unhealthy`,
/// `mark_success`, and the background health loop all serialize through the
/// same lock.
pub struct ProxyManager {
    domain_cooldown: Duration,
    health_check_url: String,
    cursor: AtomicUsize,
    inner: Mutex<Inner>,
    client: reqwest::Client,
}

impl ProxyManager {
    pub fn new(
        endpoints: Vec<ProxyEndpoint>,
        domain_cooldown_seconds: i64,
        health_check_url: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .dns_resolver(Arc::new(PublicIpResolver))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("proxy health-check client config is static and valid");

        Self {
            domain_cooldown: Duration::from_secs(domain_cooldown_seconds.max(0) as u64),
            health_check_url: health_check_url.into(),
            cursor: AtomicUsize::new(0),
            inner: Mutex::new(Inner { endpoints }),
            client,
        }
    }

    /// Scans at most `N = len(pool)` positions starting at the cursor,
    /// skipping unhealthy entries and ones used for `target_domain` within
    /// the cooldown window. The cursor always advances by one per call
    /// (including on a full-scan failure and on skipped entries), so the
    /// tail of the list cannot starve.
    pub async fn select(&self, target_domain: &str) -> Result<SelectedProxy, ProxyError> {
        let mut inner = self.inner.lock().await;
        let n = inner.endpoints.len();
        if n == 0 {
            return Err(ProxyError::NoHealthyProxies);
        }

        let start = self.cursor.fetch_add(1, Ordering::SeqCst) % n;
        let now = Instant::now();

        for offset in 0..n {
            let idx = (start + offset) % n;
            let endpoint = &mut inner.endpoints[idx];
            if !endpoint.healthy {
                continue;
            }
            let in_cooldown = endpoint
                .last_used_domains
                .get(target_domain)
                .is_some_and(|last| now.duration_since(*last) < self.domain_cooldown);
            if in_cooldown {
                continue;
            }

            endpoint
                .last_used_domains
                .insert(target_domain.to_string(), now);
            return Ok(SelectedProxy {
                url: endpoint.url.clone(),
                protocol: endpoint.protocol,
                region: endpoint.region.clone(),
            });
        }

        Err(ProxyError::NoHealthyProxies)
    }

    pub async fn mark_unhealthy(&self, url: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(endpoint) = inner.endpoints.iter_mut().find(|e| e.url == url) {
            endpoint.healthy = false;
            endpoint.failure_count += 1;
            tracing::warn!(proxy = url, "marking proxy unhealthy");
        }
    }

    pub async fn mark_success(&self, url: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(endpoint) = inner.endpoints.iter_mut().find(|e| e.url == url) {
            endpoint.success_count += 1;
        }
    }

    pub async fn get_stats(&self) -> ProxyManagerStats {
        let inner = self.inner.lock().await;
        let healthy = inner.endpoints.iter().filter(|e| e.healthy).count();
        ProxyManagerStats {
            total: inner.endpoints.len(),
            healthy,
            unhealthy: inner.endpoints.len() - healthy,
        }
    }

    /// Every `interval`, issues a lightweight HEAD request through each
    /// currently-unhealthy proxy against the configured known-good endpoint;
    /// any response with status < 500 marks it healthy again. Runs until the
    /// returned handle is aborted or dropped along with the owning task.
    pub fn spawn_health_loop(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                manager.run_health_probe().await;
            }
        })
    }

    async fn run_health_probe(&self) {
        let candidates: Vec<String> = {
            let inner = self.inner.lock().await;
            inner
                .endpoints
                .iter()
                .filter(|e| !e.healthy)
                .map(|e| e.url.clone())
                .collect()
        };

        for url in candidates {
            let proxy = match reqwest::Proxy::all(&url) {
                Ok(proxy) => proxy,
                Err(err) => {
                    tracing::warn!(proxy = %url, error = %err, "invalid proxy URL during health probe");
                    continue;
                }
            };

            let probe_client = reqwest::Client::builder()
                .proxy(proxy)
                .timeout(Duration::from_secs(5))
                .build();

            let restored = match probe_client {
                Ok(client) => client
                    .head(&self.health_check_url)
                    .send()
                    .await
                    .is_ok_and(|response| response.status().as_u16() < 500),
                Err(_) => false,
            };

            if restored {
                let mut inner = self.inner.lock().await;
                if let Some(endpoint) = inner.endpoints.iter_mut().find(|e| e.url == url) {
                    endpoint.healthy = true;
                    tracing::info!(proxy = %url, "proxy health restored");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(url: &str) -> ProxyEndpoint {
        ProxyEndpoint::parse(url).expect("valid proxy url")
    }

    #[tokio::test]
    async fn round_robins_across_domains() {
        let manager = ProxyManager::new(
            vec![endpoint("http://p1.example:8080"), endpoint("http://p2.example:8080")],
            30,
            "http://example.com".to_string(),
        );

        let first = manager.select("a.com").await.unwrap();
        let second = manager.select("a.com").await.unwrap();
        assert_ne!(first.url, second.url);
    }

    #[tokio::test]
    async fn cooldown_is_per_domain() {
        let manager = ProxyManager::new(
            vec![endpoint("http://p1.example:8080"), endpoint("http://p2.example:8080")],
            30,
            "http://example.com".to_string(),
        );

        let a1 = manager.select("a.com").await.unwrap();
        let _a2 = manager.select("a.com").await.unwrap();
        // p1 is now in cooldown for a.com but free for b.com.
        let b1 = manager.select("b.com").await.unwrap();
        assert_eq!(b1.url, a1.url);
    }

    #[tokio::test]
    async fn unhealthy_excluded_until_restored() {
        let manager = ProxyManager::new(vec![endpoint("http://p1.example:8080")], 0, "http://example.com".to_string());
        manager.mark_unhealthy("http://p1.example:8080").await;
        assert!(manager.select("a.com").await.is_err());
    }

    #[tokio::test]
    async fn empty_pool_fails() {
        let manager = ProxyManager::new(vec![], 30, "http://example.com".to_string());
        assert!(manager.select("a.com").await.is_err());
    }
}
