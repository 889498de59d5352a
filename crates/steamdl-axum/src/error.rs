//! Axum-specific error types and mappings.
//!
//! Maps `JobError` to HTTP status codes and the JSON error body.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use steamdl_core::JobError;
use thiserror::Error;

/// Axum-specific error type.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Submission rejected before any state was created.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Operation not valid for the job's current status.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The orchestrator is shutting down.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HttpError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable discriminant, shared with `JobError::category`.
    const fn error_type(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "INVALID_SPEC",
            Self::Conflict(_) => "CONFLICT",
            Self::ServiceUnavailable(_) => "SHUTTING_DOWN",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
    /// Stable error type discriminant for client-side handling
    #[serde(rename = "type")]
    error_type: &'static str,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: match &self {
                Self::NotFound(msg)
                | Self::BadRequest(msg)
                | Self::Conflict(msg)
                | Self::ServiceUnavailable(msg)
                | Self::Internal(msg) => msg.clone(),
            },
            status: status.as_u16(),
            error_type: self.error_type(),
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<JobError> for HttpError {
    fn from(err: JobError) -> Self {
        let message = err.to_string();
        match err {
            JobError::InvalidSpec { .. } => Self::BadRequest(message),
            JobError::NotFound { .. } => Self::NotFound(message),
            JobError::Conflict { .. } => Self::Conflict(message),
            JobError::ShuttingDown => Self::ServiceUnavailable(message),
            JobError::Internal { .. } => Self::Internal(message),
        }
    }
}

impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for HttpError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}
