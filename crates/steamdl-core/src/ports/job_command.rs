//! Command planning port.
//!
//! Turns a job into the concrete command line of the external executable.
//! The supervisor spawns whatever plan it is given; it knows nothing about
//! steamcmd.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::job::{Credentials, Job};

/// Everything a planner may use to build a command.
#[derive(Clone, Copy, Debug)]
pub struct LaunchRequest<'a> {
    pub job: &'a Job,
    pub credentials: Option<&'a Credentials>,
}

/// A fully resolved command line.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandPlan {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Indices into `args` that must never be logged.
    pub redacted: Vec<usize>,
}

impl CommandPlan {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            redacted: Vec::new(),
        }
    }

    /// Append a loggable argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append an argument that is masked in [`Self::display_redacted`].
    #[must_use]
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.redacted.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// The command line with secret arguments replaced by `***`.
    pub fn display_redacted(&self) -> String {
        let mut out = self.program.display().to_string();
        for (idx, arg) in self.args.iter().enumerate() {
            out.push(' ');
            if self.redacted.contains(&idx) {
                out.push_str("***");
            } else {
                out.push_str(arg);
            }
        }
        out
    }
}

impl fmt::Debug for CommandPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandPlan")
            .field("command", &self.display_redacted())
            .field("working_dir", &self.working_dir)
            .finish()
    }
}

/// Planning failed; the job cannot be launched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    /// Account login requested but the secrets are gone (e.g. after restart).
    #[error("credentials for {username} are not available")]
    MissingCredentials { username: String },
}

/// Port for building the command line of one job.
pub trait JobCommandPort: Send + Sync {
    fn plan(&self, request: &LaunchRequest<'_>) -> Result<CommandPlan, PlanError>;
}
