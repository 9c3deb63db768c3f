//! `/health`, `/readiness`, `/metrics` — unauthenticated component-stats
//! surfaces.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use scraper_common::envelope::ApiEnvelope;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let browser = state.browser_pool.get_stats().await;
    let proxy = state.proxy_manager.get_stats().await;

    let snapshot = serde_json::json!({
        "browser_pool": {
            "total": browser.total,
            "available": browser.available,
            "in_use": browser.in_use,
            "pages_processed": browser.pages_processed,
            "recycled_count": browser.recycled_count,
        },
        "proxy_pool": {
            "total": proxy.total,
            "healthy": proxy.healthy,
            "unhealthy": proxy.unhealthy,
        },
    });

    Json(ApiEnvelope::ok(snapshot))
}

/// Ready iff at least one browser instance is available and at least one
/// proxy passes the health filter (an empty configured proxy pool counts as
/// "no proxy requirement", so it alone never blocks readiness the same way
/// an all-unhealthy configured pool does).
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let browser = state.browser_pool.get_stats().await;
    let proxy = state.proxy_manager.get_stats().await;

    let proxies_ok = proxy.total == 0 || proxy.healthy > 0;
    let ready = browser.available > 0 && proxies_ok;

    let snapshot = serde_json::json!({
        "browser_available": browser.available,
        "proxy_healthy": proxy.healthy,
    });

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(ApiEnvelope::ok(snapshot)))
}

/// Keeps the plain JSON-envelope content contract rather than switching to
/// raw Prometheus exposition format; the `metrics` recorder installed at
/// startup backs counters/histograms for external scraping on a path this
/// service does not itself define.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let queue_stats = state.queue.get_stats().await;
    let snapshot = serde_json::json!({
        "queue_depth": queue_stats.queue_depth,
        "active_workers": queue_stats.active_workers,
        "completed_count": queue_stats.completed_count,
        "avg_duration_ms": queue_stats.avg_duration_ms,
    });

    Json(ApiEnvelope::ok(snapshot))
}
