//! `X-Service-Key` authentication: constant-time compare against the
//! configured key. Applied only to the authed routes; `/health`,
//! `/readiness`, and `/metrics` never see this layer.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use metrics::counter;
use subtle::ConstantTimeEq;

use scraper_common::error::ScraperError;

use crate::state::AppState;

pub async fn require_service_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ScraperError> {
    let provided = headers
        .get("X-Service-Key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    let expected = state.settings.service_key.as_bytes();
    let matches = provided.len() == expected.len()
        && bool::from(provided.as_bytes().ct_eq(expected));

    if !matches {
        counter!("scrape_auth_failures_total").increment(1);
        return Err(ScraperError::Authentication);
    }

    Ok(next.run(request).await)
}
