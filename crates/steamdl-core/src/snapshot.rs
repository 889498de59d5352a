//! System snapshot types.
//!
//! Snapshots are recomputed on every request and never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobStatus;

/// Number of jobs per status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub queued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl JobCounts {
    /// Count one job with `status`.
    pub const fn record(&mut self, status: JobStatus) {
        match status {
            JobStatus::Queued => self.queued += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Succeeded => self.succeeded += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub const fn total(&self) -> usize {
        self.queued + self.running + self.succeeded + self.failed + self.cancelled
    }
}

impl FromIterator<JobStatus> for JobCounts {
    fn from_iter<I: IntoIterator<Item = JobStatus>>(iter: I) -> Self {
        let mut counts = Self::default();
        for status in iter {
            counts.record(status);
        }
        counts
    }
}

/// Host resource usage at sampling time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    /// Global CPU usage, 0-100.
    pub cpu_percent: f32,
    /// Used / total memory, 0-100.
    pub memory_percent: f32,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    /// Usage of the disk holding the storage root, 0-100.
    pub disk_percent: Option<f32>,
    pub disk_available_bytes: Option<u64>,
    pub disk_total_bytes: Option<u64>,
}

/// Point-in-time aggregate of job counts, capacity and host metrics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub jobs: JobCounts,
    pub capacity: usize,
    pub free_slots: usize,
    /// `None` when the metrics probe failed.
    pub resources: Option<ResourceMetrics>,
    pub sampled_at: DateTime<Utc>,
}
