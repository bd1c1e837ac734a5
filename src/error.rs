use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

/// Errors surfaced by the tracking core.
///
/// Unreachable stops and stale positions are not errors: they come back as
/// `EtaStatus::NoRoute` / `EtaStatus::NoLocation`.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Not authorized")]
    Unauthorized,
    #[error("{message}")]
    Conflict { message: String, existing_id: Option<i32> },
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TrackerResult<T> = Result<T, TrackerError>;

impl TrackerError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput(reason.into())
    }
}

impl ResponseError for TrackerError {
    fn status_code(&self) -> StatusCode {
        match self {
            TrackerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            TrackerError::NotFound(_) => StatusCode::NOT_FOUND,
            TrackerError::Unauthorized => StatusCode::FORBIDDEN,
            TrackerError::Conflict { .. } => StatusCode::CONFLICT,
            TrackerError::Database(_) | TrackerError::Config(_) | TrackerError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            TrackerError::Conflict { message, existing_id } => json!({
                "status": "error",
                "error": message,
                "existing_request_id": existing_id,
            }),
            // Internal details stay in the logs.
            TrackerError::Database(e) => {
                tracing::error!("Database failure: {}", e);
                json!({ "status": "error", "error": "internal error" })
            }
            other => json!({ "status": "error", "error": other.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
