//! Centralized error types for identd.
//!
//! Uses `thiserror` for ergonomic error definitions and provides HTTP-friendly
//! error variants that convert directly into Matrix-style API responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Core application error type used across all identd services.
#[derive(Debug, thiserror::Error)]
pub enum IdentError {
    // === Request errors ===
    #[error("{message}")]
    BadRequest { message: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{resource} not found")]
    NotFound { resource: String },

    // === Binding errors ===
    #[error("A mapping already exists for this 3PID")]
    MappingAlreadyExists,

    // === Capacity ===
    #[error("Service is busy, try again later")]
    Unavailable,

    // === Infrastructure errors ===
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body, shaped like the Matrix identity service API.
#[derive(Serialize)]
struct ErrorResponse {
    errcode: &'static str,
    error: String,
}

impl IdentError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest { message: message.into() }
    }

    /// Map error to HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } | Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::MappingAlreadyExists => StatusCode::CONFLICT,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Matrix `errcode` for programmatic handling by clients.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "M_BAD_REQUEST",
            Self::Validation { .. } => "M_INVALID_PARAM",
            Self::Unauthorized => "M_UNAUTHORIZED",
            Self::NotFound { .. } => "M_NOT_FOUND",
            Self::MappingAlreadyExists => "M_THREEPID_IN_USE",
            Self::Unavailable => "M_LIMIT_EXCEEDED",
            Self::Database(_) | Self::Internal(_) => "M_UNKNOWN",
        }
    }
}

impl IntoResponse for IdentError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't leak internal details to clients
        let message = match &self {
            IdentError::Database(e) => {
                tracing::error!("Database error: {e}");
                "An internal error occurred".to_string()
            }
            IdentError::Internal(e) => {
                tracing::error!("Internal error: {e:#}");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse { errcode: self.error_code(), error: message };

        (status, axum::Json(body)).into_response()
    }
}

/// Convenience type alias for Results using IdentError.
pub type IdentResult<T> = Result<T, IdentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_conflict_maps_to_409() {
        let err = IdentError::MappingAlreadyExists;
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.error_code(), "M_THREEPID_IN_USE");
    }

    #[test]
    fn internal_errors_are_masked() {
        let resp = IdentError::Internal(anyhow::anyhow!("pool exhausted")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
