//! Host metrics probing via sysinfo.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use steamdl_core::{MetricsProbePort, ProbeError, ResourceMetrics};
use sysinfo::{Disks, MINIMUM_CPU_UPDATE_INTERVAL, System};

/// [`MetricsProbePort`] backed by sysinfo.
///
/// Keeps one `System` alive so CPU usage is measured between consecutive
/// samples. The very first sample sleeps for sysinfo's minimum interval.
pub struct SysinfoProbe {
    system: Mutex<Option<System>>,
}

impl SysinfoProbe {
    pub const fn new() -> Self {
        Self {
            system: Mutex::new(None),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsProbePort for SysinfoProbe {
    fn sample(&self, storage_root: &Path) -> Result<ResourceMetrics, ProbeError> {
        let mut guard = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        let sys = guard.get_or_insert_with(|| {
            let mut sys = System::new();
            sys.refresh_cpu_usage();
            std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
            sys
        });
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let memory_total_bytes = sys.total_memory();
        if memory_total_bytes == 0 {
            return Err(ProbeError::Unavailable("total memory reported as 0".into()));
        }
        let memory_used_bytes = sys.used_memory();

        let mut metrics = ResourceMetrics {
            cpu_percent: sys.global_cpu_usage(),
            memory_percent: percent(memory_used_bytes, memory_total_bytes),
            memory_used_bytes,
            memory_total_bytes,
            ..ResourceMetrics::default()
        };
        drop(guard);

        let disks = Disks::new_with_refreshed_list();
        let mounts: Vec<(PathBuf, u64, u64)> = disks
            .list()
            .iter()
            .map(|d| (d.mount_point().to_path_buf(), d.total_space(), d.available_space()))
            .collect();
        let root = storage_root
            .canonicalize()
            .unwrap_or_else(|_| storage_root.to_path_buf());
        if let Some((total, available)) = disk_for(&root, &mounts) {
            metrics.disk_total_bytes = Some(total);
            metrics.disk_available_bytes = Some(available);
            metrics.disk_percent = Some(percent(total.saturating_sub(available), total));
        }

        Ok(metrics)
    }
}

/// Longest mount point containing `path`: `(total, available)`.
fn disk_for(path: &Path, mounts: &[(PathBuf, u64, u64)]) -> Option<(u64, u64)> {
    mounts
        .iter()
        .filter(|(mount, total, _)| *total > 0 && path.starts_with(mount))
        .max_by_key(|(mount, _, _)| mount.components().count())
        .map(|(_, total, available)| (*total, *available))
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: u64, whole: u64) -> f32 {
    if whole == 0 {
        return 0.0;
    }
    ((part as f64 / whole as f64) * 100.0) as f32
}
