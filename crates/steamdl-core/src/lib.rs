//! Core domain types and port definitions for steamdl.
//!
//! This crate is pure: no process spawning, no filesystem access, no HTTP.
//! It defines the job model, the status graph, the error taxonomy, the
//! typed orchestrator configuration and the ports that the runtime and
//! adapters implement.
//!
//! - `job` - Job records, submission specs, status graph, exit classification
//! - `config` - `OrchestratorConfig` validated once at startup
//! - `snapshot` - System snapshot and job counts
//! - `events` - Job lifecycle events
//! - `ports` - Command planning, metrics probing and persistence traits

pub mod config;
pub mod events;
pub mod job;
pub mod ports;
pub mod snapshot;

// Re-export commonly used types for convenience
pub use config::{ConfigError, OrchestratorConfig};
pub use events::JobEvent;
pub use job::{
    AppTarget, CancelReason, CredentialMode, Credentials, ExitOutcome, FailureCause, Job, JobError,
    JobId, JobOptions, JobSpec, JobStatus, Platform, Termination, ValidatedSpec,
};
pub use ports::{
    CommandPlan, JobCommandPort, JobStateRepositoryPort, LaunchRequest, MetricsProbePort,
    NoopJobStateRepository, PlanError, ProbeError, RepositoryError,
};
pub use snapshot::{JobCounts, ResourceMetrics, SystemSnapshot};
