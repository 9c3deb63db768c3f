//! Startup and shutdown sequencing: construct every collaborator in
//! dependency order, serve the router, and on shutdown drain the queue,
//! close the browser pool, and stop the proxy health-check task.

use std::sync::Arc;
use std::time::Duration;

use envconfig::Envconfig;
use scraper_browser::{BrowserPool, FingerprintRandomizer};
use scraper_common::config::Settings;
use scraper_common::domain_policy::load_domain_policies;
use scraper_proxy::manager::ProxyEndpoint;
use scraper_proxy::ProxyManager;
use scraper_resilience::{DomainCircuitBreaker, DomainRateLimiter, RobotsChecker};
use scraper_worker::{CredentialClient, JobService, TaskExecutor, TaskQueue, WebhookDispatcher};

use crate::app::build_router;
use crate::state::AppState;
use crate::sync_waiters::SyncWaiters;

pub async fn run() -> anyhow::Result<()> {
    let settings = Settings::init_from_env()?;
    scraper_common::logging::init_logging(&settings.log_level);

    // Installs the global `metrics` recorder that every `counter!`/
    // `histogram!`/`gauge!` call in `worker` and `api` writes through.
    // `/metrics` below stays a JSON envelope per spec; this recorder is for
    // external scraping on a port/path this service does not itself define.
    let _metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("metrics recorder is only ever installed once per process");

    let settings = Arc::new(settings);

    let domain_policies = load_domain_policies(settings.domain_policies_path.as_deref());

    let rate_limiter = Arc::new(DomainRateLimiter::new(
        settings.rate_limit_tokens,
        settings.rate_limit_interval_seconds,
    ));
    rate_limiter
        .load_policies(settings.domain_policies_path.as_deref())
        .await;

    let circuit_breaker = Arc::new(DomainCircuitBreaker::new(
        settings.cb_window_size,
        settings.cb_failure_threshold,
        settings.cb_cooldown_seconds,
    ));

    let browser_pool = BrowserPool::initialize(
        settings.browser_pool_size,
        settings.browser_page_limit,
        Duration::from_secs(30),
    )
    .await?;

    let proxy_endpoints: Vec<ProxyEndpoint> = settings
        .proxy_endpoints()
        .iter()
        .filter_map(|raw| ProxyEndpoint::parse(raw))
        .collect();
    let proxy_manager = Arc::new(ProxyManager::new(
        proxy_endpoints,
        settings.proxy_domain_cooldown_seconds,
        "https://www.google.com/generate_204",
    ));
    proxy_manager.spawn_health_loop(Duration::from_secs(
        settings.proxy_health_check_interval_seconds,
    ));

    let fingerprint = Arc::new(FingerprintRandomizer::new());

    let credential_client = Arc::new(CredentialClient::new(
        settings.backend_api_url.clone(),
        settings.backend_service_key.clone(),
        settings.credential_cache_ttl_seconds,
        settings.credential_max_retries,
        Duration::from_secs(10),
    ));

    let extractor_registry = Arc::new(scraper_extraction::ExtractorRegistry::new());

    let robots_checker = Arc::new(RobotsChecker::new(3600, 10));

    let executor = Arc::new(TaskExecutor::new(
        Arc::clone(&rate_limiter),
        Arc::clone(&circuit_breaker),
        Arc::clone(&browser_pool),
        Arc::clone(&proxy_manager),
        fingerprint,
        credential_client,
        extractor_registry,
        robots_checker,
        domain_policies,
        Duration::from_secs(settings.task_timeout_seconds),
        Duration::from_millis(settings.navigation_timeout_ms),
        Duration::from_secs(10),
    ));

    let webhook = Arc::new(WebhookDispatcher::new(
        settings.webhook_secret.clone(),
        settings.default_webhook_url.clone(),
        3,
        1.0,
        Duration::from_secs(10),
    ));

    let sync_waiters = Arc::new(SyncWaiters::new());

    // The queue's single completion callback both updates the job service's
    // stores (for every task, standalone or batch) and wakes a waiting
    // `/scrape/sync` caller when one is registered for this task id.
    let job_service_slot: Arc<std::sync::OnceLock<Arc<JobService>>> =
        Arc::new(std::sync::OnceLock::new());
    let callback_job_service = Arc::clone(&job_service_slot);
    let callback_sync_waiters = Arc::clone(&sync_waiters);
    let on_complete = Arc::new(move |task: scraper_common::model::ScrapeTaskState| {
        let job_service = Arc::clone(&callback_job_service);
        let sync_waiters = Arc::clone(&callback_sync_waiters);
        tokio::spawn(async move {
            sync_waiters.notify(&task).await;
            if let Some(job_service) = job_service.get() {
                job_service.update_task_result(task).await;
            }
        });
    });

    let queue = TaskQueue::new(
        settings.max_queue_depth,
        settings.browser_pool_size.max(1),
        Duration::from_secs(settings.task_timeout_seconds),
        executor,
        on_complete,
    );
    queue.start_workers();

    let job_service = JobService::new(Arc::clone(&queue), webhook);
    let _ = job_service_slot.set(Arc::clone(&job_service));

    let state = AppState {
        settings: Arc::clone(&settings),
        job_service,
        queue: Arc::clone(&queue),
        browser_pool: Arc::clone(&browser_pool),
        proxy_manager,
        rate_limiter,
        circuit_breaker,
        sync_waiters,
        sync_default_timeout: Duration::from_secs(60),
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", settings.port)).await?;
    tracing::info!(port = settings.port, "listening");

    let graceful_shutdown_seconds = settings.graceful_shutdown_seconds;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    queue.drain(Duration::from_secs(graceful_shutdown_seconds)).await;
    browser_pool.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
