//! Router factory: public health/readiness/metrics routes plus the
//! `X-Service-Key`-gated `/api/v1/scrape*` surface, both wrapped in
//! request-id propagation and tracing.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, jobs, scrape};
use crate::middleware::auth::require_service_key;
use crate::middleware::request_id::propagate_request_id;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health::health))
        .route("/readiness", get(health::readiness))
        .route("/metrics", get(health::metrics));

    let authed = Router::new()
        .route("/api/v1/scrape", post(scrape::create_task))
        .route("/api/v1/scrape/sync", post(scrape::create_task_sync))
        .route("/api/v1/scrape/:task_id", get(scrape::get_task))
        .route("/api/v1/scrape/batch", post(jobs::create_job))
        .route("/api/v1/scrape/jobs/:job_id", get(jobs::get_job))
        .route(
            "/api/v1/scrape/jobs/:job_id/results",
            get(jobs::get_job_results),
        )
        .route(
            "/api/v1/scrape/jobs/:job_id/cancel",
            post(jobs::cancel_job),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_service_key,
        ));

    public
        .merge(authed)
        .layer(middleware::from_fn(propagate_request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
