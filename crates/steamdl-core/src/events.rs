//! Job lifecycle events - discriminated union for all job state changes.
//!
//! Clients handle this as a tagged union:
//!
//! ```typescript
//! type JobEvent =
//!   | { type: "job_submitted"; job: Job }
//!   | { type: "job_started"; job: Job }
//!   | { type: "job_cancel_requested"; job: Job }
//!   | { type: "job_finished"; job: Job }
//!   | { type: "job_deleted"; id: string };
//! ```

use serde::{Deserialize, Serialize};

use crate::job::{Job, JobId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job was accepted and queued.
    JobSubmitted { job: Job },
    /// A job was admitted and its subprocess spawned.
    JobStarted { job: Job },
    /// Cancellation of a running job was requested.
    JobCancelRequested { job: Job },
    /// A job reached a terminal status.
    JobFinished { job: Job },
    /// A terminal record was removed.
    JobDeleted { id: JobId },
}

impl JobEvent {
    /// Event name for SSE framing.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::JobSubmitted { .. } => "job_submitted",
            Self::JobStarted { .. } => "job_started",
            Self::JobCancelRequested { .. } => "job_cancel_requested",
            Self::JobFinished { .. } => "job_finished",
            Self::JobDeleted { .. } => "job_deleted",
        }
    }
}
