use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::envelope::{ApiEnvelope, ValidationFieldError};

/// The full error taxonomy. Each variant carries a fixed HTTP status and a
/// human message, mirroring the `ScraperError` hierarchy the executor and
/// HTTP layer both speak.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("{0}")]
    Validation(String),
    #[error("validation failed")]
    ValidationFields(Vec<ValidationFieldError>),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("authentication failed")]
    Authentication,
    #[error("no browser instance available within timeout")]
    PoolExhausted,
    #[error("task queue is full")]
    QueueFull,
    #[error("circuit breaker open for domain")]
    CircuitOpen,
    #[error("no healthy proxies available")]
    NoHealthyProxies,
    #[error("credential not found")]
    CredentialNotFound,
    #[error("task '{0}' not found")]
    TaskNotFound(String),
    #[error("job '{0}' not found")]
    JobNotFound(String),
    #[error("task exceeded its time budget")]
    TaskTimeout,
    #[error("internal error")]
    Internal,
}

impl ScraperError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ScraperError::Validation(_) | ScraperError::ValidationFields(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ScraperError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            ScraperError::Authentication => StatusCode::UNAUTHORIZED,
            ScraperError::PoolExhausted
            | ScraperError::QueueFull
            | ScraperError::CircuitOpen
            | ScraperError::NoHealthyProxies => StatusCode::SERVICE_UNAVAILABLE,
            ScraperError::CredentialNotFound => StatusCode::BAD_GATEWAY,
            ScraperError::TaskNotFound(_) | ScraperError::JobNotFound(_) => StatusCode::NOT_FOUND,
            ScraperError::TaskTimeout => StatusCode::GATEWAY_TIMEOUT,
            ScraperError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// `meta.fields` for validation errors; `None` for every other kind.
    fn fields(&self) -> Option<&[ValidationFieldError]> {
        match self {
            ScraperError::ValidationFields(fields) => Some(fields),
            _ => None,
        }
    }
}

impl IntoResponse for ScraperError {
    fn into_response(self) -> Response {
        // Unhandled/internal errors log full detail server-side; the body
        // returned to the caller always carries the generic message, never
        // a traceback.
        if matches!(self, ScraperError::Internal) {
            tracing::error!(error = %self, "internal error");
        }

        let status = self.status_code();
        let meta = self
            .fields()
            .map(|fields| serde_json::json!({ "fields": fields }));
        let body: ApiEnvelope<()> = ApiEnvelope {
            success: false,
            data: None,
            error: Some(self.to_string()),
            meta,
        };
        (status, axum::Json(body)).into_response()
    }
}
