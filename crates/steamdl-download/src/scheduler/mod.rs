//! Queue scheduler.
//!
//! The scheduler turns submissions into supervised steamcmd processes while
//! keeping at most `max_concurrent_downloads` of them alive.
//!
//! # Concurrency Model
//!
//! - One `tokio::sync::Mutex<SchedulerState>` guards records, gate, queue and
//!   the running set; every status change and admission decision happens
//!   under it
//! - One supervised task per running job owns its `Child`
//! - One completion loop receives `ExitReport`s, finalizes the job, releases
//!   the gate slot and re-runs admission
//! - One persistence writer applies record changes in commit order
//!
//! A gate slot is released only when the exit report arrives, i.e. after the
//! subprocess has been reaped.

mod persist;
mod state;

use chrono::Utc;
use futures_util::future::join_all;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use steamdl_core::{
    CancelReason, ConfigError, CredentialMode, ExitOutcome, FailureCause, Job, JobCommandPort,
    JobCounts, JobError, JobEvent, JobId, JobSpec, JobStateRepositoryPort, JobStatus,
    LaunchRequest, OrchestratorConfig, RepositoryError, Termination,
};
use steamdl_runtime::{
    ExitReport, LogLine, LogPage, LogStream, ProcessSupervisor, SupervisorHandle,
};

use crate::store::JobStore;
use persist::PersistHandle;
use state::{ActiveJob, SchedulerState};

/// Full log file name inside each job directory.
pub const LOG_FILE: &str = "job.log";

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Dependencies for starting a scheduler.
pub struct SchedulerDeps {
    pub config: OrchestratorConfig,
    /// Builds the command line for each job.
    pub planner: Arc<dyn JobCommandPort>,
    /// Record persistence; pass `NoopJobStateRepository` to disable.
    pub repository: Arc<dyn JobStateRepositoryPort>,
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot prepare storage root {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot load persisted jobs: {0}")]
    Repository(#[from] RepositoryError),
}

/// Result of [`Scheduler::delete`].
#[derive(Debug, Clone, PartialEq)]
pub enum Deleted {
    /// The terminal record was removed.
    Removed(Job),
    /// The job was still live and has been cancelled instead.
    Cancelled(Job),
}

/// Consistent read of counts and gate occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerLoad {
    pub jobs: JobCounts,
    pub capacity: usize,
    pub free_slots: usize,
}

/// Handle to the running scheduler. Cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<SchedulerState>,
    config: OrchestratorConfig,
    planner: Arc<dyn JobCommandPort>,
    supervisor: ProcessSupervisor,
    events: broadcast::Sender<JobEvent>,
    persist: PersistHandle,
}

impl Scheduler {
    /// Validate the configuration, restore persisted jobs and start the
    /// completion loop.
    pub async fn start(deps: SchedulerDeps) -> Result<Self, StartError> {
        let SchedulerDeps {
            config,
            planner,
            repository,
        } = deps;
        config.validate()?;
        tokio::fs::create_dir_all(&config.storage_root)
            .await
            .map_err(|source| StartError::Storage {
                path: config.storage_root.clone(),
                source,
            })?;

        let restored = repository.load_all().await?;
        let persist = PersistHandle::spawn(repository);

        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let supervisor =
            ProcessSupervisor::new(reports_tx, config.cancel_grace_period, config.job_timeout);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let mut state = SchedulerState::new(
            JobStore::new(&config.storage_root, config.max_log_lines),
            config.max_concurrent_downloads,
        );
        restore(&mut state, restored, &persist, config.max_history);

        let inner = Arc::new(Inner {
            state: Mutex::new(state),
            config,
            planner,
            supervisor,
            events,
            persist,
        });
        tokio::spawn(completion_loop(Arc::downgrade(&inner), reports_rx));

        {
            let mut state = inner.state.lock().await;
            inner.admit(&mut state).await;
            info!(
                target: "steamdl.scheduler",
                capacity = inner.config.max_concurrent_downloads,
                storage_root = %inner.config.storage_root.display(),
                restored = state.store.len(),
                "scheduler started"
            );
        }

        Ok(Self { inner })
    }

    /// Accept a download request.
    ///
    /// The returned job is already `running` (or `failed`) when a slot was
    /// free, `queued` otherwise.
    pub async fn submit(&self, spec: JobSpec) -> Result<Job, JobError> {
        let mut state = self.inner.state.lock().await;
        if !state.accepting {
            return Err(JobError::ShuttingDown);
        }

        let id = state.store.create(spec, Utc::now())?;
        state.queue.push(id);
        let job = state.store.get(&id)?;
        info!(
            target: "steamdl.scheduler",
            job_id = %id,
            app_id = job.target.app_id(),
            queued = state.queue.len(),
            "job submitted"
        );
        self.inner.publish(JobEvent::JobSubmitted { job });

        self.inner.admit(&mut state).await;
        state.store.get(&id)
    }

    pub async fn get(&self, id: &JobId) -> Result<Job, JobError> {
        self.inner.state.lock().await.store.get(id)
    }

    /// All jobs in submission order.
    pub async fn list(&self) -> Vec<Job> {
        self.inner.state.lock().await.store.list()
    }

    pub async fn counts(&self) -> JobCounts {
        self.inner.state.lock().await.counts()
    }

    pub fn capacity(&self) -> usize {
        self.inner.config.max_concurrent_downloads
    }

    pub fn storage_root(&self) -> &Path {
        &self.inner.config.storage_root
    }

    /// Counts and gate occupancy from one lock acquisition.
    pub async fn load(&self) -> SchedulerLoad {
        let state = self.inner.state.lock().await;
        SchedulerLoad {
            jobs: state.counts(),
            capacity: state.gate.capacity(),
            free_slots: state.gate.available(),
        }
    }

    /// Buffered log lines with `seq >= since`.
    pub async fn logs(&self, id: &JobId, since: u64) -> Result<LogPage, JobError> {
        let log = {
            let state = self.inner.state.lock().await;
            Arc::clone(&state.store.record(id)?.log)
        };
        Ok(log.since(since))
    }

    /// Buffered lines from `since` plus a receiver for every later line.
    pub async fn subscribe_logs(
        &self,
        id: &JobId,
        since: u64,
    ) -> Result<(LogPage, broadcast::Receiver<LogLine>), JobError> {
        let log = {
            let state = self.inner.state.lock().await;
            Arc::clone(&state.store.record(id)?.log)
        };
        Ok(log.follow(since))
    }

    /// Lifecycle events for all jobs.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Cancel a job.
    ///
    /// Queued jobs are cancelled on the spot. Running jobs are signalled and
    /// the call waits (bounded) for the subprocess to be reaped; if the bound
    /// elapses the still-running job is returned. Terminal jobs are a
    /// `Conflict`.
    pub async fn cancel(&self, id: &JobId) -> Result<Job, JobError> {
        let waiter = {
            let mut state = self.inner.state.lock().await;
            let status = state.store.record(id)?.job.status;
            match status {
                JobStatus::Queued => {
                    state.queue.remove(id);
                    let job = self.inner.finish_locked(
                        &mut state,
                        id,
                        &Termination::Cancelled(CancelReason::Requested),
                        None,
                    )?;
                    self.inner.prune(&mut state);
                    return Ok(job);
                }
                JobStatus::Running => {
                    let Some(waiter) = state.wait_for(id) else {
                        return state.store.get(id);
                    };
                    let first = state
                        .active
                        .get(id)
                        .is_some_and(|a| a.handle.request_cancel(CancelReason::Requested));
                    if first {
                        let now = Utc::now();
                        let job = state.store.update(id, |job| {
                            job.cancel_requested_at.get_or_insert(now);
                        })?;
                        info!(target: "steamdl.scheduler", job_id = %id, "cancellation requested");
                        self.inner.publish(JobEvent::JobCancelRequested { job });
                    }
                    waiter
                }
                terminal => {
                    return Err(JobError::conflict(id, terminal, "job already finished"));
                }
            }
        };

        match timeout(self.inner.config.stop_bound(), waiter).await {
            Ok(Ok(job)) => Ok(job),
            Ok(Err(_)) => self.get(id).await,
            Err(_) => {
                warn!(target: "steamdl.scheduler", job_id = %id, "job did not stop within the cancellation bound");
                self.get(id).await
            }
        }
    }

    /// Remove a terminal record, or cancel a live job.
    pub async fn delete(&self, id: &JobId) -> Result<Deleted, JobError> {
        // A job can finish between the check and the cancel; the second pass
        // then finds it terminal.
        for _ in 0..2 {
            {
                let mut state = self.inner.state.lock().await;
                if state.store.record(id)?.job.is_terminal() {
                    let job = state.store.delete(id)?;
                    info!(target: "steamdl.scheduler", job_id = %id, "job removed");
                    self.inner.publish(JobEvent::JobDeleted { id: *id });
                    return Ok(Deleted::Removed(job));
                }
            }
            match self.cancel(id).await {
                Ok(job) => return Ok(Deleted::Cancelled(job)),
                Err(JobError::Conflict { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Err(JobError::internal("job state kept changing during delete"))
    }

    /// Stop accepting work, cancel queued jobs and stop running ones.
    ///
    /// Queued jobs cancelled here are not persisted as cancelled, so with
    /// persistence enabled they are re-queued on the next start.
    pub async fn shutdown(&self) {
        let (handles, waiters) = {
            let mut state = self.inner.state.lock().await;
            state.accepting = false;

            let now = Utc::now();
            while let Some(id) = state.queue.pop() {
                let termination = Termination::Cancelled(CancelReason::Shutdown);
                match state.store.update(&id, |job| job.finish(&termination, None, now)) {
                    Ok(job) => self.inner.broadcast(JobEvent::JobFinished { job }),
                    Err(e) => warn!(target: "steamdl.scheduler", job_id = %id, error = %e, "could not cancel queued job"),
                }
            }

            let ids: Vec<JobId> = state.active.keys().copied().collect();
            let waiters: Vec<_> = ids.iter().filter_map(|id| state.wait_for(id)).collect();
            let handles: Vec<SupervisorHandle> =
                state.active.values().map(|a| a.handle.clone()).collect();
            (handles, waiters)
        };

        if !handles.is_empty() {
            info!(target: "steamdl.scheduler", running = handles.len(), "stopping running jobs");
        }
        let bound = self.inner.config.stop_bound();
        let stops = join_all(handles.iter().map(|h| h.cancel(CancelReason::Shutdown)));
        if timeout(bound, stops).await.is_err() {
            warn!(target: "steamdl.scheduler", "running jobs did not stop within the shutdown bound");
        }
        let _ = timeout(bound, join_all(waiters)).await;

        self.inner.persist.flush().await;
        info!(target: "steamdl.scheduler", "scheduler stopped");
    }
}

impl Inner {
    /// Start queued jobs while the gate has room.
    async fn admit(&self, state: &mut SchedulerState) {
        while !state.queue.is_empty() {
            let Some(mut permit) = state.gate.try_acquire() else {
                break;
            };
            let Some(id) = state.queue.pop() else {
                state.gate.release(&mut permit);
                break;
            };

            match self.launch(state, &id).await {
                Ok(handle) => {
                    let now = Utc::now();
                    match state.store.update(&id, |job| {
                        job.status = JobStatus::Running;
                        job.started_at = Some(now);
                    }) {
                        Ok(job) => {
                            info!(
                                target: "steamdl.scheduler",
                                job_id = %id,
                                app_id = job.target.app_id(),
                                pid = ?handle.pid(),
                                "job started"
                            );
                            state.active.insert(
                                id,
                                ActiveJob {
                                    permit,
                                    handle,
                                    waiters: Vec::new(),
                                },
                            );
                            self.publish(JobEvent::JobStarted { job });
                        }
                        Err(e) => {
                            error!(target: "steamdl.scheduler", job_id = %id, error = %e, "admitted job could not enter running");
                            handle.request_cancel(CancelReason::Requested);
                            state.gate.release(&mut permit);
                        }
                    }
                }
                Err(cause) => {
                    warn!(target: "steamdl.scheduler", job_id = %id, %cause, "job failed to start");
                    state.gate.release(&mut permit);
                    let _ = self.finish_locked(state, &id, &Termination::Failed(cause), None);
                }
            }
        }
        self.prune(state);
    }

    /// Prepare the workspace, plan the command and spawn it.
    ///
    /// Workspace I/O goes through `tokio::fs` and is awaited with the lock
    /// held, so admission order stays the gate order.
    async fn launch(
        &self,
        state: &SchedulerState,
        id: &JobId,
    ) -> Result<SupervisorHandle, FailureCause> {
        let record = state.store.record(id).map_err(|e| FailureCause::Workspace {
            message: e.to_string(),
        })?;
        let job = &record.job;
        let job_dir = self.config.job_dir(id);

        tokio::fs::create_dir_all(&job.destination)
            .await
            .map_err(|e| FailureCause::Workspace {
                message: format!("{}: {e}", job.destination.display()),
            })?;
        let spill = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(job_dir.join(LOG_FILE))
            .await
            .map_err(|e| FailureCause::Workspace {
                message: format!("{}: {e}", job_dir.display()),
            })?;
        record.log.attach_spill(spill.into_std().await);

        let started = self
            .planner
            .plan(&LaunchRequest {
                job,
                credentials: record.credentials.as_ref(),
            })
            .map_err(|e| e.to_string())
            .and_then(|plan| {
                self.supervisor
                    .start(*id, &plan, Arc::clone(&record.log))
                    .map_err(|e| e.to_string())
            });

        started.map_err(|message| {
            record
                .log
                .append(LogStream::System, format!("failed to start: {message}"));
            record.log.close_spill();
            FailureCause::Spawn { message }
        })
    }

    /// Move a job to a terminal state and publish it.
    fn finish_locked(
        &self,
        state: &mut SchedulerState,
        id: &JobId,
        termination: &Termination,
        outcome: Option<&ExitOutcome>,
    ) -> Result<Job, JobError> {
        let now = Utc::now();
        let job = state
            .store
            .update(id, |job| job.finish(termination, outcome, now))?;
        info!(
            target: "steamdl.scheduler",
            job_id = %id,
            status = %job.status,
            exit_code = ?job.exit_code,
            forced_kill = job.forced_kill,
            "job finished"
        );
        self.publish(JobEvent::JobFinished { job: job.clone() });
        Ok(job)
    }

    /// Handle one exit report: finalize, release, notify, re-admit.
    async fn finalize(&self, report: ExitReport) {
        let mut state = self.state.lock().await;
        let Some(mut active) = state.active.remove(&report.job_id) else {
            debug!(target: "steamdl.scheduler", job_id = %report.job_id, "exit report for a job that is not running");
            return;
        };

        let termination = report.outcome.classify();
        let finished =
            self.finish_locked(&mut state, &report.job_id, &termination, Some(&report.outcome));
        state.gate.release(&mut active.permit);

        match finished {
            Ok(job) => {
                for waiter in active.waiters {
                    let _ = waiter.send(job.clone());
                }
            }
            Err(e) => {
                error!(target: "steamdl.scheduler", job_id = %report.job_id, error = %e, "could not record job exit");
            }
        }

        self.admit(&mut state).await;
    }

    fn prune(&self, state: &mut SchedulerState) {
        for id in state.store.prune_history(self.config.max_history) {
            debug!(target: "steamdl.scheduler", job_id = %id, "evicted from history");
            self.publish(JobEvent::JobDeleted { id });
        }
    }

    /// Persist the change carried by `event`, then broadcast it.
    fn publish(&self, event: JobEvent) {
        match &event {
            JobEvent::JobDeleted { id } => self.persist.remove(*id),
            JobEvent::JobSubmitted { job }
            | JobEvent::JobStarted { job }
            | JobEvent::JobCancelRequested { job }
            | JobEvent::JobFinished { job } => self.persist.save(job),
        }
        self.broadcast(event);
    }

    fn broadcast(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

async fn completion_loop(inner: Weak<Inner>, mut reports: mpsc::UnboundedReceiver<ExitReport>) {
    while let Some(report) = reports.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.finalize(report).await;
    }
    debug!(target: "steamdl.scheduler", "completion loop exiting");
}

/// Re-insert persisted records.
///
/// Queued jobs go back in the queue in submission order. Jobs that were
/// running, and queued account jobs whose secrets were never persisted,
/// become `failed` with an `interrupted` cause.
fn restore(
    state: &mut SchedulerState,
    jobs: Vec<Job>,
    persist: &PersistHandle,
    max_history: usize,
) {
    let now = Utc::now();
    for mut job in jobs {
        let stale = match job.status {
            JobStatus::Running => true,
            JobStatus::Queued => matches!(job.credential, CredentialMode::Account { .. }),
            _ => false,
        };
        if stale {
            warn!(target: "steamdl.scheduler", job_id = %job.id, status = %job.status, "job interrupted by restart");
            job.finish(&Termination::Failed(FailureCause::Interrupted), None, now);
            persist.save(&job);
        }

        let id = job.id;
        let queued = job.status == JobStatus::Queued;
        state.store.restore(job);
        if queued {
            state.queue.push(id);
        }
    }

    for id in state.store.prune_history(max_history) {
        persist.remove(id);
    }
}
