//! Startup errors and the HTTP error envelope.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use tripflow_core::error::DomainError;

/// Startup errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Applying the schema migrations failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body of every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    /// Set when the same request may succeed if resent unchanged.
    pub retryable: bool,
    /// Present for rejected state transitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<TransitionDetail>,
}

#[derive(Debug, Serialize)]
pub struct TransitionDetail {
    pub from: String,
    pub to: String,
}

/// Maps `DomainError` onto HTTP.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// Status code and machine-readable code for the wrapped error.
    #[must_use]
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            DomainError::Unauthorized(_) => (StatusCode::FORBIDDEN, "unauthorized"),
            DomainError::AggregateNotFound(_) => (StatusCode::NOT_FOUND, "trip_not_found"),
            DomainError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            DomainError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            DomainError::ConcurrencyConflict { .. } => {
                (StatusCode::CONFLICT, "concurrency_conflict")
            }
            DomainError::Dependency(_) => (StatusCode::BAD_GATEWAY, "dependency_error"),
            DomainError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error")
            }
        }
    }

    fn body(&self, code: &'static str) -> ErrorBody {
        let transition = match &self.0 {
            DomainError::InvalidTransition { from, to } => Some(TransitionDetail {
                from: from.clone(),
                to: to.clone(),
            }),
            _ => None,
        };
        ErrorBody {
            error: code,
            message: self.0.to_string(),
            retryable: matches!(
                self.0,
                DomainError::ConcurrencyConflict { .. } | DomainError::Dependency(_)
            ),
            transition,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();
        if status.is_server_error() {
            error!(error = %self.0, code, "request failed");
        }
        (status, Json(self.body(code))).into_response()
    }
}
