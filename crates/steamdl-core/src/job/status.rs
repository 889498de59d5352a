//! Job status graph and terminal causes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a job.
///
/// ```text
/// queued ──► running ──► succeeded | failed | cancelled
///   │
///   ├──► cancelled   (cancelled before admission)
///   └──► failed      (spawn or workspace error, never entered running)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a gate slot.
    Queued,
    /// Subprocess is alive.
    Running,
    /// Subprocess exited with code 0.
    Succeeded,
    /// Spawn error, non-zero exit, or abnormal termination.
    Failed,
    /// Cancelled by request or timeout.
    Cancelled,
}

impl JobStatus {
    /// Whether no further transition can leave this status.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Whether `self → next` is an edge of the status graph.
    ///
    /// Self-edges are not transitions and return `false`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running | Self::Cancelled | Self::Failed)
                | (
                    Self::Running,
                    Self::Succeeded | Self::Failed | Self::Cancelled
                )
        )
    }

    /// Lowercase wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job ended up `failed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    /// The executable could not be launched.
    Spawn {
        /// OS error description.
        message: String,
    },
    /// The per-job directory could not be prepared.
    Workspace {
        /// I/O error description.
        message: String,
    },
    /// The subprocess exited with a non-zero code.
    ExitCode {
        /// The exit code.
        code: i32,
    },
    /// The subprocess was killed by a signal nobody in this process sent.
    Signal {
        /// Signal number, when the platform reports one.
        signal: Option<i32>,
    },
    /// Waiting on the subprocess failed.
    Wait {
        /// I/O error description.
        message: String,
    },
    /// The orchestrator restarted while the job was running.
    Interrupted,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn { message } => write!(f, "spawn error: {message}"),
            Self::Workspace { message } => write!(f, "workspace error: {message}"),
            Self::ExitCode { code } => write!(f, "exited with code {code}"),
            Self::Signal { signal: Some(sig) } => write!(f, "killed by signal {sig}"),
            Self::Signal { signal: None } => f.write_str("terminated abnormally"),
            Self::Wait { message } => write!(f, "wait failed: {message}"),
            Self::Interrupted => f.write_str("interrupted by restart"),
        }
    }
}

/// Why a job ended up `cancelled`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// An explicit cancel or delete request.
    Requested,
    /// The per-job timeout elapsed.
    TimedOut,
    /// The orchestrator is shutting down.
    Shutdown,
}
