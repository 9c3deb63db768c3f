//! `/api/v1/scrape/batch`, `/api/v1/scrape/jobs/{job_id}`,
//! `/api/v1/scrape/jobs/{job_id}/results`,
//! `/api/v1/scrape/jobs/{job_id}/cancel`.

use axum::extract::{Path, State};
use axum::Json;

use scraper_common::envelope::ApiEnvelope;
use scraper_common::error::ScraperError;
use scraper_common::model::ScrapeJobState;

use crate::dto::{validate_batch_scrape_request, BatchScrapeRequestDto};
use crate::state::AppState;

fn job_view(job: &ScrapeJobState) -> serde_json::Value {
    serde_json::json!({
        "job_id": job.id,
        "total_tasks": job.total_tasks,
        "completed_tasks": job.completed_tasks,
        "failed_tasks": job.failed_tasks,
        "status": job.status,
    })
}

pub async fn create_job(
    State(state): State<AppState>,
    Json(body): Json<BatchScrapeRequestDto>,
) -> Result<Json<ApiEnvelope<serde_json::Value>>, ScraperError> {
    validate_batch_scrape_request(&body).await?;

    let job = state
        .job_service
        .create_job(body.targets, body.callback_url)
        .await
        .map_err(|_| ScraperError::QueueFull)?;

    Ok(Json(ApiEnvelope::ok(job_view(&job))))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ApiEnvelope<serde_json::Value>>, ScraperError> {
    let job = state
        .job_service
        .get_job(&job_id)
        .await
        .ok_or_else(|| ScraperError::JobNotFound(job_id))?;

    Ok(Json(ApiEnvelope::ok(job_view(&job))))
}

pub async fn get_job_results(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ApiEnvelope<serde_json::Value>>, ScraperError> {
    if state.job_service.get_job(&job_id).await.is_none() {
        return Err(ScraperError::JobNotFound(job_id));
    }

    let results = state
        .job_service
        .get_job_results(&job_id)
        .await
        .unwrap_or_default();

    let count = results.len();
    let results: Vec<serde_json::Value> = results
        .iter()
        .map(|task| {
            serde_json::json!({
                "task_id": task.id,
                "target_url": task.target_url,
                "result": task.result,
            })
        })
        .collect();

    Ok(Json(ApiEnvelope::ok(serde_json::json!({
        "results": results,
        "count": count,
    }))))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ApiEnvelope<serde_json::Value>>, ScraperError> {
    let job = state
        .job_service
        .cancel_job(&job_id)
        .await
        .map_err(|_| ScraperError::JobNotFound(job_id))?;

    Ok(Json(ApiEnvelope::ok(job_view(&job))))
}
