use std::sync::Arc;
use std::time::Duration;

use scraper_browser::BrowserPool;
use scraper_common::config::Settings;
use scraper_proxy::ProxyManager;
use scraper_resilience::{DomainCircuitBreaker, DomainRateLimiter};
use scraper_worker::{JobService, TaskQueue};

use crate::sync_waiters::SyncWaiters;

/// Everything an axum handler needs, cloned cheaply per request since every
/// field is an `Arc` (or `Copy`).
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub job_service: Arc<JobService>,
    pub queue: Arc<TaskQueue>,
    pub browser_pool: Arc<BrowserPool>,
    pub proxy_manager: Arc<ProxyManager>,
    pub rate_limiter: Arc<DomainRateLimiter>,
    pub circuit_breaker: Arc<DomainCircuitBreaker>,
    pub sync_waiters: Arc<SyncWaiters>,
    pub sync_default_timeout: Duration,
}
