//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces the orchestrator needs without committing to
//! an implementation. Concrete implementations live in `steamdl-runtime`
//! and are injected by the composition root.

pub mod job_command;
pub mod job_state;
pub mod metrics_probe;

use thiserror::Error;

pub use job_command::{CommandPlan, JobCommandPort, LaunchRequest, PlanError};
pub use job_state::{JobStateRepositoryPort, NoopJobStateRepository};
pub use metrics_probe::{MetricsProbePort, ProbeError};

/// Domain-specific errors for persistence operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    /// Storage backend error (filesystem).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}
