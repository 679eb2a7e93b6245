//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::repository::RepositoryError;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Repository(RepositoryError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Repository(RepositoryError::Duplicate(_)) => StatusCode::CONFLICT,
            AppError::Repository(RepositoryError::Io(_) | RepositoryError::Parse(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Repository(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, details) = match &self {
            AppError::Repository(e @ (RepositoryError::Io(_) | RepositoryError::Parse(_))) => {
                tracing::error!("Repository error: {:?}", e);
                ("Repository error".to_string(), Some(e.to_string()))
            }
            AppError::Repository(e) => {
                tracing::debug!("Rejected request: {}", e);
                (e.to_string(), None)
            }
            other => (other.to_string(), None),
        };

        (status, Json(ErrorResponse { error, details })).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
