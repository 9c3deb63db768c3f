use envconfig::Envconfig;

/// Process-wide settings, loaded once at startup from the environment
/// (prefix `SCRAPER_`). A missing required variable fails startup
/// immediately rather than falling back to a placeholder.
#[derive(Debug, Clone, Envconfig)]
pub struct Settings {
    #[envconfig(from = "SCRAPER_SERVICE_KEY")]
    pub service_key: String,

    #[envconfig(from = "SCRAPER_BACKEND_API_URL")]
    pub backend_api_url: String,

    #[envconfig(from = "SCRAPER_BACKEND_SERVICE_KEY")]
    pub backend_service_key: String,

    #[envconfig(from = "SCRAPER_WEBHOOK_SECRET")]
    pub webhook_secret: String,

    #[envconfig(from = "SCRAPER_DEFAULT_WEBHOOK_URL")]
    pub default_webhook_url: Option<String>,

    #[envconfig(from = "SCRAPER_PORT", default = "8001")]
    pub port: u16,

    #[envconfig(from = "SCRAPER_LOG_LEVEL", default = "INFO")]
    pub log_level: String,

    #[envconfig(from = "SCRAPER_BROWSER_POOL_SIZE", default = "5")]
    pub browser_pool_size: usize,

    #[envconfig(from = "SCRAPER_BROWSER_PAGE_LIMIT", default = "100")]
    pub browser_page_limit: u64,

    #[envconfig(from = "SCRAPER_NAVIGATION_TIMEOUT_MS", default = "30000")]
    pub navigation_timeout_ms: u64,

    #[envconfig(from = "SCRAPER_MAX_QUEUE_DEPTH", default = "500")]
    pub max_queue_depth: usize,

    #[envconfig(from = "SCRAPER_TASK_TIMEOUT_SECONDS", default = "60")]
    pub task_timeout_seconds: u64,

    #[envconfig(from = "SCRAPER_RATE_LIMIT_TOKENS", default = "2")]
    pub rate_limit_tokens: f64,

    #[envconfig(from = "SCRAPER_RATE_LIMIT_INTERVAL_SECONDS", default = "10")]
    pub rate_limit_interval_seconds: f64,

    #[envconfig(from = "SCRAPER_CB_WINDOW_SIZE", default = "10")]
    pub cb_window_size: usize,

    #[envconfig(from = "SCRAPER_CB_FAILURE_THRESHOLD", default = "5")]
    pub cb_failure_threshold: usize,

    #[envconfig(from = "SCRAPER_CB_COOLDOWN_SECONDS", default = "120")]
    pub cb_cooldown_seconds: i64,

    #[envconfig(from = "SCRAPER_PROXY_ENDPOINTS", default = "")]
    pub proxy_endpoints_raw: String,

    #[envconfig(from = "SCRAPER_PROXY_HEALTH_CHECK_INTERVAL_SECONDS", default = "60")]
    pub proxy_health_check_interval_seconds: u64,

    #[envconfig(from = "SCRAPER_PROXY_DOMAIN_COOLDOWN_SECONDS", default = "30")]
    pub proxy_domain_cooldown_seconds: i64,

    #[envconfig(from = "SCRAPER_CREDENTIAL_CACHE_TTL_SECONDS", default = "300")]
    pub credential_cache_ttl_seconds: i64,

    #[envconfig(from = "SCRAPER_CREDENTIAL_MAX_RETRIES", default = "3")]
    pub credential_max_retries: u32,

    #[envconfig(from = "SCRAPER_GRACEFUL_SHUTDOWN_SECONDS", default = "30")]
    pub graceful_shutdown_seconds: u64,

    #[envconfig(from = "SCRAPER_DOMAIN_POLICIES_PATH")]
    pub domain_policies_path: Option<String>,
}

impl Settings {
    /// `PROXY_ENDPOINTS` is a comma-separated list; an empty value yields an
    /// empty pool, a valid (if useless) configuration.
    pub fn proxy_endpoints(&self) -> Vec<String> {
        self.proxy_endpoints_raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
