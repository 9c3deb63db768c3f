//! Request bodies and their validation against spec-shaped rules. Validation
//! never panics. Body shape rejections become a `ScraperError::ValidationFields`
//! carrying one entry per offending field; a bad batch target URL is reported
//! separately as `ScraperError::InvalidUrl`.

use scraper_common::error::ScraperError;
use scraper_common::envelope::ValidationFieldError;
use scraper_common::model::TargetType;
use scraper_common::ssrf::validate_url;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ScrapeRequestDto {
    pub target_type: TargetType,
    pub target_url: String,
    pub workspace_id: String,
    #[serde(default)]
    pub requested_fields: Option<Vec<String>>,
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SyncScrapeRequestDto {
    pub target_type: TargetType,
    pub target_url: String,
    pub workspace_id: String,
    #[serde(default)]
    pub requested_fields: Option<Vec<String>>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct BatchScrapeRequestDto {
    pub targets: Vec<scraper_common::model::BatchTarget>,
    #[serde(default)]
    pub callback_url: Option<String>,
}

fn field_error(field: &str, message: impl Into<String>, kind: &str) -> ValidationFieldError {
    ValidationFieldError {
        field: field.to_string(),
        message: message.into(),
        kind: kind.to_string(),
    }
}

async fn check_url(field: &str, url: &str, errors: &mut Vec<ValidationFieldError>) {
    if url.is_empty() {
        errors.push(field_error(field, "must not be empty", "missing"));
        return;
    }
    if !validate_url(url).await {
        errors.push(field_error(field, "url is not reachable per SSRF policy", "invalid_url"));
    }
}

pub async fn validate_scrape_request(body: &ScrapeRequestDto) -> Result<(), ScraperError> {
    let mut errors = Vec::new();
    check_url("target_url", &body.target_url, &mut errors).await;
    if body.workspace_id.is_empty() {
        errors.push(field_error("workspace_id", "must not be empty", "missing"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ScraperError::ValidationFields(errors))
    }
}

pub async fn validate_sync_scrape_request(body: &SyncScrapeRequestDto) -> Result<(), ScraperError> {
    let mut errors = Vec::new();
    check_url("target_url", &body.target_url, &mut errors).await;
    if body.workspace_id.is_empty() {
        errors.push(field_error("workspace_id", "must not be empty", "missing"));
    }
    if let Some(timeout) = body.timeout_seconds {
        if !(5..=120).contains(&timeout) {
            errors.push(field_error(
                "timeout_seconds",
                "must be between 5 and 120",
                "out_of_range",
            ));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ScraperError::ValidationFields(errors))
    }
}

/// Batch validation runs in two passes with two distinct failure contracts.
/// Shape errors (wrong entry count, a missing `workspace_id`) are body
/// validation failures and return 422 like the other endpoints. A malformed
/// or SSRF-blocked target URL is not a body shape problem, it's a bad
/// request, so it short-circuits with a dedicated 400 naming the offending
/// target instead of folding into the 422 envelope.
pub async fn validate_batch_scrape_request(
    body: &BatchScrapeRequestDto,
) -> Result<(), ScraperError> {
    let mut errors = Vec::new();
    if body.targets.is_empty() || body.targets.len() > 100 {
        errors.push(field_error(
            "targets",
            "must contain between 1 and 100 entries",
            "out_of_range",
        ));
    }
    for (idx, target) in body.targets.iter().enumerate() {
        if target.workspace_id.is_empty() {
            errors.push(field_error(
                &format!("targets[{idx}].workspace_id"),
                "must not be empty",
                "missing",
            ));
        }
    }
    if !errors.is_empty() {
        return Err(ScraperError::ValidationFields(errors));
    }

    for (idx, target) in body.targets.iter().enumerate() {
        if target.target_url.is_empty() {
            return Err(ScraperError::InvalidUrl(format!(
                "targets[{idx}].target_url must not be empty"
            )));
        }
        if !validate_url(&target.target_url).await {
            return Err(ScraperError::InvalidUrl(format!(
                "targets[{idx}].target_url is not reachable per SSRF policy"
            )));
        }
    }

    Ok(())
}
