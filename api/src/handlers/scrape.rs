//! `/api/v1/scrape`, `/api/v1/scrape/sync`, `/api/v1/scrape/{task_id}`.

use axum::extract::{Path, State};
use axum::Json;

use scraper_common::envelope::ApiEnvelope;
use scraper_common::error::ScraperError;
use scraper_common::model::ScrapeTaskState;

use crate::dto::{validate_scrape_request, validate_sync_scrape_request, ScrapeRequestDto, SyncScrapeRequestDto};
use crate::state::AppState;

fn task_view(task: &ScrapeTaskState) -> serde_json::Value {
    serde_json::json!({
        "task_id": task.id,
        "status": task.status,
        "result": task.result,
        "error": task.error,
    })
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<ScrapeRequestDto>,
) -> Result<Json<ApiEnvelope<serde_json::Value>>, ScraperError> {
    validate_scrape_request(&body).await?;

    let task = ScrapeTaskState::new(
        body.target_type,
        body.target_url,
        body.requested_fields,
        body.workspace_id,
        None,
        0,
    );
    let task_id = task.id.clone();

    state
        .job_service
        .submit_task(task)
        .await
        .map_err(|_| ScraperError::QueueFull)?;

    Ok(Json(ApiEnvelope::ok(serde_json::json!({
        "task_id": task_id,
        "status": "queued",
    }))))
}

pub async fn create_task_sync(
    State(state): State<AppState>,
    Json(body): Json<SyncScrapeRequestDto>,
) -> Result<Json<ApiEnvelope<serde_json::Value>>, ScraperError> {
    validate_sync_scrape_request(&body).await?;

    let timeout = body
        .timeout_seconds
        .map(std::time::Duration::from_secs)
        .unwrap_or(state.sync_default_timeout);

    let task = ScrapeTaskState::new(
        body.target_type,
        body.target_url,
        body.requested_fields,
        body.workspace_id,
        None,
        0,
    );
    let task_id = task.id.clone();

    let receiver = state.sync_waiters.register(&task_id).await;

    state
        .job_service
        .submit_task(task)
        .await
        .map_err(|_| ScraperError::QueueFull)?;

    match tokio::time::timeout(timeout, receiver).await {
        Ok(Ok(completed)) => Ok(Json(ApiEnvelope::ok(task_view(&completed)))),
        Ok(Err(_)) => Err(ScraperError::Internal),
        Err(_) => {
            state.sync_waiters.cancel(&task_id).await;
            Err(ScraperError::TaskTimeout)
        }
    }
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<ApiEnvelope<serde_json::Value>>, ScraperError> {
    let task = state
        .job_service
        .get_task(&task_id)
        .await
        .ok_or_else(|| ScraperError::TaskNotFound(task_id))?;

    Ok(Json(ApiEnvelope::ok(task_view(&task))))
}
