//! The single-task execution pipeline: rate limit, circuit check, browser
//! acquisition, fingerprint application, proxy selection, navigation,
//! extraction, normalization, release — all under one outer timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Timelike;
use chromiumoxide::page::Page;
use scraper_browser::{BrowserPool, FingerprintProfile, FingerprintRandomizer};
use scraper_common::domain_policy::DomainPolicy;
use scraper_common::model::ScrapeTaskState;
use scraper_extraction::normalizer::normalize;
use scraper_extraction::ExtractorRegistry;
use scraper_proxy::manager::SelectedProxy;
use scraper_proxy::ProxyManager;
use scraper_resilience::{DomainCircuitBreaker, DomainRateLimiter, RobotsChecker};
use serde_json::Value;
use url::Url;

use crate::credential::CredentialClient;

/// Derives the rate-limit/circuit-breaker/proxy-cooldown domain key from a
/// target URL: the host, or the leading path segment when the URL doesn't
/// parse at all.
pub fn derive_domain(target_url: &str) -> String {
    match Url::parse(target_url) {
        Ok(parsed) => parsed
            .host_str()
            .map(str::to_string)
            .unwrap_or_else(|| fallback_domain(target_url)),
        Err(_) => fallback_domain(target_url),
    }
}

fn fallback_domain(target_url: &str) -> String {
    target_url
        .trim_start_matches('/')
        .split('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(target_url)
        .to_string()
}

/// Collaborators the executor orchestrates for one task. Constructed once at
/// startup and shared (via `Arc`) across every worker.
pub struct TaskExecutor {
    rate_limiter: Arc<DomainRateLimiter>,
    circuit_breaker: Arc<DomainCircuitBreaker>,
    browser_pool: Arc<BrowserPool>,
    proxy_manager: Arc<ProxyManager>,
    fingerprint: Arc<FingerprintRandomizer>,
    credential_client: Arc<CredentialClient>,
    extractor_registry: Arc<ExtractorRegistry>,
    robots_checker: Arc<RobotsChecker>,
    domain_policies: HashMap<String, DomainPolicy>,
    task_timeout: Duration,
    navigation_timeout: Duration,
    browser_acquire_timeout: Duration,
}

impl TaskExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rate_limiter: Arc<DomainRateLimiter>,
        circuit_breaker: Arc<DomainCircuitBreaker>,
        browser_pool: Arc<BrowserPool>,
        proxy_manager: Arc<ProxyManager>,
        fingerprint: Arc<FingerprintRandomizer>,
        credential_client: Arc<CredentialClient>,
        extractor_registry: Arc<ExtractorRegistry>,
        robots_checker: Arc<RobotsChecker>,
        domain_policies: HashMap<String, DomainPolicy>,
        task_timeout: Duration,
        navigation_timeout: Duration,
        browser_acquire_timeout: Duration,
    ) -> Self {
        Self {
            rate_limiter,
            circuit_breaker,
            browser_pool,
            proxy_manager,
            fingerprint,
            credential_client,
            extractor_registry,
            robots_checker,
            domain_policies,
            task_timeout,
            navigation_timeout,
            browser_acquire_timeout,
        }
    }

    fn policy_for(&self, domain: &str) -> &DomainPolicy {
        self.domain_policies
            .get(domain)
            .or_else(|| self.domain_policies.get("default"))
            .expect("a `default` domain policy is always present")
    }

    /// Runs the full pipeline for `task`, mutating it in place to its
    /// terminal `Completed`/`Failed` status. Never panics or propagates an
    /// error — every failure mode is captured into the task itself.
    #[tracing::instrument(skip_all, fields(task_id = %task.id, target_url = %task.target_url))]
    pub async fn execute(&self, task: &mut ScrapeTaskState) {
        let domain = derive_domain(&task.target_url);
        task.mark_running();

        match tokio::time::timeout(self.task_timeout, self.run(&domain, task)).await {
            Ok(Ok(result)) => {
                self.circuit_breaker.record_success(&domain).await;
                tracing::info!(target_domain = %domain, "task completed");
                task.mark_completed(result);
            }
            Ok(Err(Failure::NoBreakerRecord(message))) => {
                tracing::warn!(target_domain = %domain, error = %message, "task failed before contacting target");
                task.mark_failed(message);
            }
            Ok(Err(Failure::Recorded(message))) => {
                self.circuit_breaker.record_failure(&domain).await;
                tracing::warn!(target_domain = %domain, error = %message, "task failed");
                task.mark_failed(message);
            }
            Err(_elapsed) => {
                self.circuit_breaker.record_failure(&domain).await;
                tracing::warn!(target_domain = %domain, "task exceeded its outer time budget");
                task.mark_failed("task exceeded its time budget");
            }
        }
    }

    /// Steps 3-13 of the pipeline. `circuit-open`, `pool-exhausted` and
    /// `no-healthy-proxies` never record a breaker failure — the target was
    /// never contacted. Everything from proxy selection onward does, and
    /// also marks the selected proxy unhealthy.
    async fn run(&self, domain: &str, task: &ScrapeTaskState) -> Result<Value, Failure> {
        self.rate_limiter.acquire(domain).await;

        if !self.circuit_breaker.can_call(domain).await {
            return Err(Failure::NoBreakerRecord(
                "circuit breaker open for domain".into(),
            ));
        }

        let policy = self.policy_for(domain);
        if let Some(hours) = &policy.allowed_hours {
            let current_hour = chrono::Utc::now().hour() as u8;
            if !hours.contains(current_hour) {
                return Err(Failure::NoBreakerRecord(
                    "domain policy disallows scraping at this hour".into(),
                ));
            }
        }
        if policy.respect_robots_txt {
            self.robots_checker.fetch_robots_txt(domain).await;
            let path = Url::parse(&task.target_url)
                .map(|u| u.path().to_string())
                .unwrap_or_else(|_| "/".to_string());
            if !self.robots_checker.is_url_allowed(domain, &path, "*").await {
                return Err(Failure::NoBreakerRecord(
                    "robots.txt disallows this path".into(),
                ));
            }
        }

        let browser_id = self
            .browser_pool
            .acquire(self.browser_acquire_timeout)
            .await
            .map_err(|_| Failure::NoBreakerRecord("no browser instance available within timeout".into()))?;

        let outcome = self.run_with_browser(domain, task, browser_id).await;
        self.browser_pool.release(browser_id).await;
        outcome
    }

    async fn run_with_browser(
        &self,
        domain: &str,
        task: &ScrapeTaskState,
        browser_id: uuid::Uuid,
    ) -> Result<Value, Failure> {
        let proxy = self
            .proxy_manager
            .select(domain)
            .await
            .map_err(|_| Failure::NoBreakerRecord("no healthy proxies available".into()))?;

        match self.run_with_proxy(domain, task, browser_id, &proxy).await {
            Ok(value) => {
                self.proxy_manager.mark_success(&proxy.url).await;
                Ok(value)
            }
            Err(message) => {
                self.proxy_manager.mark_unhealthy(&proxy.url).await;
                Err(Failure::Recorded(message))
            }
        }
    }

    async fn run_with_proxy(
        &self,
        domain: &str,
        task: &ScrapeTaskState,
        browser_id: uuid::Uuid,
        proxy: &SelectedProxy,
    ) -> Result<Value, String> {
        let profile: FingerprintProfile = self.fingerprint.generate(proxy.region.as_deref());

        let page = self
            .browser_pool
            .new_page(browser_id, "about:blank")
            .await
            .map_err(|err| err.to_string())?;

        let result = self.run_on_page(&page, domain, task, &profile).await;

        if let Err(err) = page.close().await {
            tracing::warn!(error = %err, "failed to close page after task, releasing browser anyway");
        }

        result
    }

    async fn run_on_page(
        &self,
        page: &Page,
        domain: &str,
        task: &ScrapeTaskState,
        profile: &FingerprintProfile,
    ) -> Result<Value, String> {
        scraper_browser::fingerprint::apply(page, profile)
            .await
            .map_err(|err| err.to_string())?;

        // Credential fetch is non-fatal: the task proceeds credential-less
        // on any failure. The credential value itself is never logged here
        // or anywhere in `CredentialClient`.
        let provider = task.target_type.credential_provider();
        if let Err(err) = self
            .credential_client
            .get_credential(&task.workspace_id, provider)
            .await
        {
            tracing::info!(provider, error = %err, "proceeding without workspace credential");
        }

        match tokio::time::timeout(self.navigation_timeout, page.goto(&task.target_url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => return Err(format!("navigation failed: {err}")),
            Err(_) => return Err("task exceeded its time budget".to_string()),
        }

        let policy = self.policy_for(domain);
        let delay = self
            .fingerprint
            .action_delay(policy.min_delay_ms, policy.max_delay_ms);
        tokio::time::sleep(delay).await;

        let extractor = self
            .extractor_registry
            .get(task.target_type)
            .ok_or_else(|| "no extractor registered for target type".to_string())?;

        let raw = extractor
            .extract(page, &task.target_url, task.requested_fields.as_deref())
            .await
            .map_err(|err| err.to_string())?;

        Ok(normalize(&raw, task.target_type, task.requested_fields.as_deref()))
    }
}

enum Failure {
    /// `circuit-open`, `pool-exhausted`, `no-healthy-proxies`: the target
    /// was never contacted, so no breaker failure is recorded.
    NoBreakerRecord(String),
    /// Everything after proxy selection: breaker failure and proxy
    /// unhealthy marking both apply.
    Recorded(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_domain_from_host() {
        assert_eq!(derive_domain("https://example.com/p?x=1"), "example.com");
    }

    #[test]
    fn falls_back_to_leading_path_segment_on_malformed_url() {
        assert_eq!(derive_domain("not a url at all"), "not a url at all");
        assert_eq!(derive_domain("/relative/path"), "relative");
    }
}
