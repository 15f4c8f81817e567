//! HTTP error mapping for the scoring API.

use crate::error::ScoreError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Application error type with HTTP response mapping.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Invalid request data (400).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Resource not found (404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request too large (413).
    #[error("Payload too large: {0}")]
    TooLarge(String),

    /// Internal server error (500).
    #[error("Internal error: {0}")]
    Internal(String),

    /// No model loaded (503).
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::TooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.parts().0
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    message: &'a str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = self.parts();
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

impl From<ScoreError> for AppError {
    fn from(err: ScoreError) -> Self {
        if err.is_client_error() {
            AppError::BadRequest(err.to_string())
        } else {
            AppError::Internal(err.to_string())
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("scoring task failed: {}", err))
    }
}

/// Result type alias for handlers.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    #[test]
    fn test_score_errors_map_to_status() {
        let invalid: AppError = ScoreError::from(ValidationError::new("age", "too young")).into();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let threshold: AppError = ScoreError::InvalidThreshold(2.0).into();
        assert_eq!(threshold.status(), StatusCode::BAD_REQUEST);

        let inference: AppError = ScoreError::Inference("session closed".into()).into();
        assert_eq!(inference.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_display() {
        let err = AppError::Unavailable("no model loaded".into());
        assert_eq!(err.to_string(), "Service unavailable: no model loaded");
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
