use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::sse::error::SseError;

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Operation needs collaborators this deployment was not configured with.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// The operation was interrupted by shutdown.
    #[error("operation cancelled")]
    Cancelled,
    /// Writing to a client stream failed.
    #[error("stream failure: {0}")]
    Stream(String),
}

impl From<SseError> for ServiceError {
    fn from(err: SseError) -> Self {
        match err {
            SseError::NotConnected => ServiceError::InvalidState("client is not connected".into()),
            SseError::UnsupportedOperation => ServiceError::Unsupported(err.to_string()),
            SseError::Cancelled => ServiceError::Cancelled,
            SseError::Sink(source) => ServiceError::Stream(source.to_string()),
        }
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Feature disabled by configuration.
    #[error("not implemented: {0}")]
    NotImplemented(String),
    /// Service unavailable or shutting down.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::Unsupported(message) => AppError::NotImplemented(message),
            ServiceError::Cancelled => AppError::ServiceUnavailable("shutting down".into()),
            ServiceError::Stream(message) => AppError::Internal(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
