//! Orchestrator configuration.
//!
//! Built once by the composition root and validated before anything runs.
//! Nothing reconfigures it afterwards.

use std::path::PathBuf;
use std::time::Duration;

/// Default number of simultaneous steamcmd processes.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 1;

/// Default per-job timeout.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(3600);

/// Default time between SIGTERM and SIGKILL.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(10);

/// Default in-memory log lines kept per job.
pub const DEFAULT_MAX_LOG_LINES: usize = 5000;

/// Default number of terminal jobs retained.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// How long to wait for a SIGKILLed child to be reaped.
pub const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for output readers after the child is reaped.
pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Typed orchestrator configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Gate capacity.
    pub max_concurrent_downloads: usize,
    /// Every job writes under `<storage_root>/<job_id>/`.
    pub storage_root: PathBuf,
    /// `None` disables the per-job timeout.
    pub job_timeout: Option<Duration>,
    pub cancel_grace_period: Duration,
    pub max_log_lines: usize,
    pub max_history: usize,
    /// Write `job.json` per job and restore on startup.
    pub persist_jobs: bool,
}

impl OrchestratorConfig {
    /// Defaults with the given storage root.
    pub fn with_storage_root(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            storage_root: storage_root.into(),
            job_timeout: Some(DEFAULT_JOB_TIMEOUT),
            cancel_grace_period: DEFAULT_CANCEL_GRACE,
            max_log_lines: DEFAULT_MAX_LOG_LINES,
            max_history: DEFAULT_MAX_HISTORY,
            persist_jobs: false,
        }
    }

    /// Check every bound. Called once at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_downloads == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.storage_root.as_os_str().is_empty() {
            return Err(ConfigError::EmptyStorageRoot);
        }
        if self.cancel_grace_period.is_zero() {
            return Err(ConfigError::ZeroGracePeriod);
        }
        if self.job_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_log_lines == 0 {
            return Err(ConfigError::ZeroLogLines);
        }
        if self.max_history == 0 {
            return Err(ConfigError::ZeroHistory);
        }
        Ok(())
    }

    /// Upper bound on how long a running job takes to stop once asked.
    pub fn stop_bound(&self) -> Duration {
        self.cancel_grace_period + KILL_REAP_TIMEOUT + OUTPUT_DRAIN_TIMEOUT
    }

    /// `<storage_root>/<job_id>`
    pub fn job_dir(&self, id: &crate::JobId) -> PathBuf {
        self.storage_root.join(id.to_string())
    }
}

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_concurrent_downloads must be at least 1")]
    ZeroCapacity,

    #[error("storage root cannot be empty")]
    EmptyStorageRoot,

    #[error("cancel grace period must be positive")]
    ZeroGracePeriod,

    #[error("job timeout must be positive when set")]
    ZeroTimeout,

    #[error("max_log_lines must be at least 1")]
    ZeroLogLines,

    #[error("max_history must be at least 1")]
    ZeroHistory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = OrchestratorConfig::with_storage_root("/srv/steam");
        assert!(config.validate().is_ok());
        assert_eq!(config.max_concurrent_downloads, 1);
        assert_eq!(config.job_timeout, Some(Duration::from_secs(3600)));
        assert_eq!(config.stop_bound(), Duration::from_secs(17));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = OrchestratorConfig {
            max_concurrent_downloads: 0,
            ..OrchestratorConfig::with_storage_root("/srv/steam")
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroCapacity));
    }

    #[test]
    fn zero_bounds_are_rejected() {
        let base = OrchestratorConfig::with_storage_root("/srv/steam");
        let grace = OrchestratorConfig {
            cancel_grace_period: Duration::ZERO,
            ..base.clone()
        };
        assert_eq!(grace.validate(), Err(ConfigError::ZeroGracePeriod));

        let timeout = OrchestratorConfig {
            job_timeout: Some(Duration::ZERO),
            ..base.clone()
        };
        assert_eq!(timeout.validate(), Err(ConfigError::ZeroTimeout));

        let empty = OrchestratorConfig::with_storage_root("");
        assert_eq!(empty.validate(), Err(ConfigError::EmptyStorageRoot));
    }
}
