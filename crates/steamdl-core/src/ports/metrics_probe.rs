//! Host metrics probe port.
//!
//! Implementations may block (sysinfo refreshes sleep internally), so
//! callers run them on a blocking thread.

use std::path::Path;
use thiserror::Error;

use crate::snapshot::ResourceMetrics;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("metrics unavailable: {0}")]
    Unavailable(String),
}

/// Port for sampling CPU, memory and disk usage.
pub trait MetricsProbePort: Send + Sync {
    /// Sample current usage. Disk figures refer to the disk holding
    /// `storage_root`.
    fn sample(&self, storage_root: &Path) -> Result<ResourceMetrics, ProbeError>;
}
