//! Job domain types.
//!
//! A [`Job`] is the serializable snapshot of one requested download. The
//! record store owns the authoritative copy; everything else gets clones.

mod errors;
mod outcome;
mod spec;
mod status;
mod target;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

pub use errors::JobError;
pub use outcome::{ExitOutcome, Termination};
pub use spec::{CredentialMode, Credentials, JobOptions, JobSpec, Platform, ValidatedSpec};
pub use status::{CancelReason, FailureCause, JobStatus};
pub use target::AppTarget;

/// Opaque job identifier (UUID v4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Snapshot of one download job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub target: AppTarget,
    /// `target` as the client sent it; a store URL stays a URL here.
    #[serde(default)]
    pub requested_target: String,
    pub credential: CredentialMode,
    pub options: JobOptions,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub failure: Option<FailureCause>,
    pub cancel_reason: Option<CancelReason>,
    pub cancel_requested_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub forced_kill: bool,
    /// Directory steamcmd installs into.
    pub destination: PathBuf,
    /// Last percentage reported by steamcmd. Live only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
}

impl Job {
    /// New `queued` job for a validated submission.
    pub fn new(
        id: JobId,
        spec: &ValidatedSpec,
        destination: PathBuf,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            target: spec.target,
            requested_target: spec.requested_target.clone(),
            credential: spec.credential.clone(),
            options: spec.options.clone(),
            status: JobStatus::Queued,
            submitted_at,
            started_at: None,
            completed_at: None,
            exit_code: None,
            failure: None,
            cancel_reason: None,
            cancel_requested_at: None,
            forced_kill: false,
            destination,
            progress: None,
        }
    }

    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record a terminal result. Status validity is checked by the store.
    pub fn finish(
        &mut self,
        termination: &Termination,
        outcome: Option<&ExitOutcome>,
        now: DateTime<Utc>,
    ) {
        self.status = termination.status();
        self.completed_at = Some(now);
        match termination {
            Termination::Succeeded => {}
            Termination::Failed(cause) => self.failure = Some(cause.clone()),
            Termination::Cancelled(reason) => self.cancel_reason = Some(*reason),
        }
        if let Some(outcome) = outcome {
            self.exit_code = outcome.code;
            self.forced_kill = outcome.forced_kill;
        }
    }
}
