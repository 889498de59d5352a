//! System status reporter.
//!
//! Read-only: takes one consistent read of the scheduler, then samples host
//! metrics on a blocking thread. Never mutates job state.

use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

use steamdl_core::{MetricsProbePort, SystemSnapshot};

use crate::scheduler::Scheduler;

#[derive(Clone)]
pub struct StatusReporter {
    scheduler: Scheduler,
    probe: Arc<dyn MetricsProbePort>,
}

impl StatusReporter {
    pub fn new(scheduler: Scheduler, probe: Arc<dyn MetricsProbePort>) -> Self {
        Self { scheduler, probe }
    }

    /// Recompute the snapshot. Metrics are `None` if the probe fails.
    pub async fn snapshot(&self) -> SystemSnapshot {
        let load = self.scheduler.load().await;

        let probe = Arc::clone(&self.probe);
        let root = self.scheduler.storage_root().to_path_buf();
        let resources = match tokio::task::spawn_blocking(move || probe.sample(&root)).await {
            Ok(Ok(metrics)) => Some(metrics),
            Ok(Err(e)) => {
                warn!(error = %e, "metrics probe failed");
                None
            }
            Err(e) => {
                warn!(error = %e, "metrics probe task failed");
                None
            }
        };

        SystemSnapshot {
            jobs: load.jobs,
            capacity: load.capacity,
            free_slots: load.free_slots,
            resources,
            sampled_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use steamdl_core::{
        CommandPlan, JobCommandPort, JobSpec, LaunchRequest, NoopJobStateRepository,
        OrchestratorConfig, PlanError, ProbeError, ResourceMetrics,
    };

    use crate::scheduler::SchedulerDeps;

    struct FixedProbe(Option<ResourceMetrics>);

    impl MetricsProbePort for FixedProbe {
        fn sample(&self, _storage_root: &Path) -> Result<ResourceMetrics, ProbeError> {
            self.0
                .clone()
                .ok_or_else(|| ProbeError::Unavailable("test".into()))
        }
    }

    struct Sleeper;

    impl JobCommandPort for Sleeper {
        fn plan(&self, _request: &LaunchRequest<'_>) -> Result<CommandPlan, PlanError> {
            Ok(CommandPlan::new("/bin/sh").arg("-c").arg("exec sleep 30"))
        }
    }

    async fn scheduler(root: &Path) -> Scheduler {
        Scheduler::start(SchedulerDeps {
            config: OrchestratorConfig::with_storage_root(root),
            planner: Arc::new(Sleeper),
            repository: Arc::new(NoopJobStateRepository),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn snapshot_reports_counts_and_slots() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(dir.path()).await;
        scheduler.submit(JobSpec::anonymous("1")).await.unwrap();
        scheduler.submit(JobSpec::anonymous("2")).await.unwrap();

        let metrics = ResourceMetrics {
            cpu_percent: 12.5,
            memory_percent: 40.0,
            ..ResourceMetrics::default()
        };
        let reporter = StatusReporter::new(scheduler.clone(), Arc::new(FixedProbe(Some(metrics.clone()))));
        let snapshot = reporter.snapshot().await;

        assert_eq!(snapshot.capacity, 1);
        assert_eq!(snapshot.free_slots, 0);
        assert_eq!(snapshot.jobs.running, 1);
        assert_eq!(snapshot.jobs.queued, 1);
        assert_eq!(snapshot.resources, Some(metrics));

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn probe_failure_still_yields_a_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(dir.path()).await;
        let reporter = StatusReporter::new(scheduler, Arc::new(FixedProbe(None)));

        let snapshot = reporter.snapshot().await;
        assert!(snapshot.resources.is_none());
        assert_eq!(snapshot.free_slots, 1);
        assert_eq!(snapshot.jobs.total(), 0);
    }
}
