//! Job error taxonomy.
//!
//! Only the variants here are ever returned to API callers. Subprocess-level
//! problems (spawn failures, non-zero exits, forced kills) are recorded on the
//! job itself as a [`FailureCause`](super::FailureCause) and never thrown.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::JobStatus;

/// Error type for job orchestration operations.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobError {
    /// Submission input was rejected; no state was created.
    #[error("Invalid download request: {message}")]
    InvalidSpec {
        /// Why the submission was rejected.
        message: String,
    },

    /// No job with the given id exists.
    #[error("Job not found: {id}")]
    NotFound {
        /// The id that was looked up.
        id: String,
    },

    /// The operation is not valid for the job's current status.
    #[error("Job {id} is {status}: {message}")]
    Conflict {
        /// The job the operation targeted.
        id: String,
        /// The status that made the operation invalid.
        status: JobStatus,
        /// What was attempted.
        message: String,
    },

    /// The orchestrator is shutting down and admits no new work.
    #[error("Orchestrator is shutting down")]
    ShuttingDown,

    /// Invariant violation or unexpected internal state.
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl JobError {
    /// Create an invalid-spec error.
    pub fn invalid_spec(message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            message: message.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(id: impl ToString) -> Self {
        Self::NotFound { id: id.to_string() }
    }

    /// Create a conflict error.
    pub fn conflict(id: impl ToString, status: JobStatus, message: impl Into<String>) -> Self {
        Self::Conflict {
            id: id.to_string(),
            status,
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable category string for API consumers.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::InvalidSpec { .. } => "INVALID_SPEC",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Internal { .. } => "INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_names_status() {
        let err = JobError::conflict("abc", JobStatus::Succeeded, "cannot cancel");
        assert_eq!(err.to_string(), "Job abc is succeeded: cannot cancel");
        assert_eq!(err.category(), "CONFLICT");
    }

    #[test]
    fn categories_are_stable() {
        assert_eq!(JobError::invalid_spec("x").category(), "INVALID_SPEC");
        assert_eq!(JobError::not_found("x").category(), "NOT_FOUND");
        assert_eq!(JobError::ShuttingDown.category(), "SHUTTING_DOWN");
        assert_eq!(JobError::internal("x").category(), "INTERNAL");
    }
}
