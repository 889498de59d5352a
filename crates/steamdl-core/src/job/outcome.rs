//! Subprocess exit classification.

use serde::{Deserialize, Serialize};

use super::{CancelReason, FailureCause, JobStatus};

/// What the supervisor observed when a subprocess ended.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitOutcome {
    /// Exit code, when the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, when the platform reports one.
    pub signal: Option<i32>,
    /// Set when waiting on the child failed and no status exists.
    pub wait_error: Option<String>,
    /// Set when the supervisor itself ended the process.
    pub cancel_reason: Option<CancelReason>,
    /// Whether SIGKILL (or an immediate kill) was needed.
    pub forced_kill: bool,
}

impl ExitOutcome {
    /// Outcome of a process that exited with `code`.
    pub const fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
            wait_error: None,
            cancel_reason: None,
            forced_kill: false,
        }
    }

    /// Map the raw observation onto a terminal job state.
    ///
    /// Supervisor-initiated termination wins over whatever exit status the
    /// child reported on its way down.
    pub fn classify(&self) -> Termination {
        if let Some(reason) = self.cancel_reason {
            return Termination::Cancelled(reason);
        }
        if let Some(message) = &self.wait_error {
            return Termination::Failed(FailureCause::Wait {
                message: message.clone(),
            });
        }
        match self.code {
            Some(0) => Termination::Succeeded,
            Some(code) => Termination::Failed(FailureCause::ExitCode { code }),
            None => Termination::Failed(FailureCause::Signal {
                signal: self.signal,
            }),
        }
    }
}

/// Terminal state a job is moved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    Succeeded,
    Failed(FailureCause),
    Cancelled(CancelReason),
}

impl Termination {
    /// The job status this termination lands on.
    pub const fn status(&self) -> JobStatus {
        match self {
            Self::Succeeded => JobStatus::Succeeded,
            Self::Failed(_) => JobStatus::Failed,
            Self::Cancelled(_) => JobStatus::Cancelled,
        }
    }
}
