/// Error types for people-service
///
/// Errors are converted to plain-text HTTP responses; the demo clients read
/// response bodies as text.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use idempotent_sink::SinkError;
use object_storage::ObjectStoreError;
use thiserror::Error;

/// Result type for people-service handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Object store or other upstream dependency failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Persistence(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Persistence(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type("text/plain; charset=utf-8")
            .body(self.to_string())
    }
}

impl From<SinkError> for AppError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::InvalidEntry(msg) => AppError::Validation(msg),
            SinkError::Persistence(e) => AppError::Persistence(e.to_string()),
        }
    }
}

impl From<ObjectStoreError> for AppError {
    fn from(err: ObjectStoreError) -> Self {
        if err.is_not_found() {
            AppError::NotFound(err.to_string())
        } else {
            AppError::Upstream(err.to_string())
        }
    }
}
