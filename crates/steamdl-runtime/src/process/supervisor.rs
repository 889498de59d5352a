//! Supervised subprocess lifecycle.
//!
//! [`ProcessSupervisor::start`] spawns one command and hands ownership of the
//! `Child` to a dedicated task. That task waits for the first of exit,
//! cancellation or timeout, brings the process down if needed, drains the
//! output readers and finally reports an [`ExitReport`] on the channel given
//! at construction.

use futures_util::future::join_all;
use std::future::pending;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use steamdl_core::config::OUTPUT_DRAIN_TIMEOUT;
use steamdl_core::{CancelReason, CommandPlan, ExitOutcome, JobId};
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::log::{JobLog, LogStream};
use super::shutdown::shutdown_child;
use super::stream::spawn_stream_reader;

/// Sent once per started process, after it was reaped and its output drained.
#[derive(Debug, Clone)]
pub struct ExitReport {
    pub job_id: JobId,
    pub outcome: ExitOutcome,
}

/// The executable could not be launched.
#[derive(Debug, Error)]
#[error("failed to spawn {program}: {source}")]
pub struct SpawnError {
    pub program: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Spawns and supervises job subprocesses.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    reports: mpsc::UnboundedSender<ExitReport>,
    grace: Duration,
    timeout: Option<Duration>,
}

impl ProcessSupervisor {
    pub const fn new(
        reports: mpsc::UnboundedSender<ExitReport>,
        grace: Duration,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            reports,
            grace,
            timeout,
        }
    }

    /// Spawn `plan` for `job_id`, streaming its output into `log`.
    ///
    /// Must be called from within a tokio runtime. Spawning is synchronous:
    /// on `Ok` the process exists.
    pub fn start(
        &self,
        job_id: JobId,
        plan: &CommandPlan,
        log: Arc<JobLog>,
    ) -> Result<SupervisorHandle, SpawnError> {
        let mut cmd = Command::new(&plan.program);
        cmd.args(&plan.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &plan.working_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| SpawnError {
            program: plan.program.clone(),
            source,
        })?;
        let pid = child.id();

        info!(target: "steamdl.supervisor", job_id = %job_id, ?pid, command = %plan.display_redacted(), "spawned subprocess");
        log.append(
            LogStream::System,
            format!("$ {}", plan.display_redacted()),
        );

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_stream_reader(
                stdout,
                job_id,
                LogStream::Stdout,
                Arc::clone(&log),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_stream_reader(
                stderr,
                job_id,
                LogStream::Stderr,
                Arc::clone(&log),
            ));
        }

        let token = CancellationToken::new();
        let reason = Arc::new(OnceLock::new());
        let (stopped_tx, stopped_rx) = watch::channel(false);

        let task = SupervisedTask {
            job_id,
            child,
            readers,
            log,
            token: token.clone(),
            reason: Arc::clone(&reason),
            grace: self.grace,
            timeout: self.timeout,
        };
        let reports = self.reports.clone();
        tokio::spawn(async move {
            let outcome = task.run().await;
            if reports.send(ExitReport { job_id, outcome }).is_err() {
                debug!(job_id = %job_id, "exit report dropped, scheduler is gone");
            }
            let _ = stopped_tx.send(true);
        });

        Ok(SupervisorHandle {
            pid,
            token,
            reason,
            stopped: stopped_rx,
        })
    }
}

/// Cancellation handle for one supervised process.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    pid: Option<u32>,
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
    stopped: watch::Receiver<bool>,
}

impl SupervisorHandle {
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Ask the task to stop the process. Returns `false` if a cancellation
    /// was already requested; the first reason wins.
    pub fn request_cancel(&self, reason: CancelReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        first
    }

    /// Request cancellation and wait until the process is reaped and its
    /// exit has been reported.
    pub async fn cancel(&self, reason: CancelReason) {
        self.request_cancel(reason);
        self.wait_stopped().await;
    }

    /// Wait until the supervised task has finished.
    pub async fn wait_stopped(&self) {
        let mut stopped = self.stopped.clone();
        // An error means the task is gone, which is just as stopped.
        let _ = stopped.wait_for(|done| *done).await;
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }
}

struct SupervisedTask {
    job_id: JobId,
    child: Child,
    readers: Vec<JoinHandle<()>>,
    log: Arc<JobLog>,
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
    grace: Duration,
    timeout: Option<Duration>,
}

impl SupervisedTask {
    async fn run(mut self) -> ExitOutcome {
        let limit = self.timeout;
        let deadline = async move {
            match limit {
                Some(limit) => sleep(limit).await,
                None => pending::<()>().await,
            }
        };

        let waited = tokio::select! {
            biased;
            () = self.token.cancelled() => None,
            () = deadline => {
                let _ = self.reason.set(CancelReason::TimedOut);
                None
            }
            status = self.child.wait() => Some(status),
        };

        let outcome = match waited {
            Some(Ok(status)) => outcome_from_status(status, None, false),
            Some(Err(e)) => {
                warn!(job_id = %self.job_id, error = %e, "waiting on subprocess failed");
                ExitOutcome {
                    wait_error: Some(e.to_string()),
                    ..ExitOutcome::default()
                }
            }
            None => self.stop().await,
        };

        self.drain().await;
        self.log.append(LogStream::System, describe(&outcome));
        self.log.close_spill();
        outcome
    }

    async fn stop(&mut self) -> ExitOutcome {
        let reason = self.reason.get().copied().unwrap_or(CancelReason::Requested);
        info!(target: "steamdl.supervisor", job_id = %self.job_id, ?reason, "stopping subprocess");
        self.log.append(
            LogStream::System,
            format!("stopping process ({})", reason_str(reason)),
        );

        match shutdown_child(&mut self.child, self.grace).await {
            Ok(shutdown) => {
                if shutdown.forced {
                    warn!(job_id = %self.job_id, "subprocess did not exit within the grace period and was killed");
                }
                outcome_from_status(shutdown.status, Some(reason), shutdown.forced)
            }
            Err(e) => {
                warn!(job_id = %self.job_id, error = %e, "subprocess shutdown failed");
                ExitOutcome {
                    wait_error: Some(e.to_string()),
                    cancel_reason: Some(reason),
                    forced_kill: true,
                    ..ExitOutcome::default()
                }
            }
        }
    }

    async fn drain(&mut self) {
        let readers = std::mem::take(&mut self.readers);
        let aborts: Vec<_> = readers.iter().map(JoinHandle::abort_handle).collect();
        if timeout(OUTPUT_DRAIN_TIMEOUT, join_all(readers)).await.is_err() {
            debug!(job_id = %self.job_id, "output readers did not finish, aborting");
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

fn outcome_from_status(
    status: ExitStatus,
    cancel_reason: Option<CancelReason>,
    forced_kill: bool,
) -> ExitOutcome {
    ExitOutcome {
        code: status.code(),
        signal: exit_signal(status),
        wait_error: None,
        cancel_reason,
        forced_kill,
    }
}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
const fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}

const fn reason_str(reason: CancelReason) -> &'static str {
    match reason {
        CancelReason::Requested => "cancel requested",
        CancelReason::TimedOut => "timed out",
        CancelReason::Shutdown => "shutting down",
    }
}

fn describe(outcome: &ExitOutcome) -> String {
    match (outcome.code, outcome.signal, &outcome.wait_error) {
        (_, _, Some(e)) => format!("process wait failed: {e}"),
        (Some(code), _, _) => format!("process exited with code {code}"),
        (None, Some(sig), _) => format!("process killed by signal {sig}"),
        (None, None, None) => "process terminated".to_string(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use steamdl_core::Termination;

    fn sh(script: &str) -> CommandPlan {
        CommandPlan::new("/bin/sh").arg("-c").arg(script)
    }

    fn supervisor(
        grace: Duration,
        timeout: Option<Duration>,
    ) -> (ProcessSupervisor, mpsc::UnboundedReceiver<ExitReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ProcessSupervisor::new(tx, grace, timeout), rx)
    }

    #[tokio::test]
    async fn reports_exit_code_after_draining_output() {
        let (sup, mut rx) = supervisor(Duration::from_secs(1), None);
        let log = Arc::new(JobLog::new(100));
        let id = JobId::new();
        sup.start(id, &sh("echo hello; echo oops >&2; exit 3"), Arc::clone(&log))
            .unwrap();

        let report = rx.recv().await.unwrap();
        assert_eq!(report.job_id, id);
        assert_eq!(report.outcome.code, Some(3));
        assert!(report.outcome.cancel_reason.is_none());

        let lines: Vec<String> = log.since(0).lines.into_iter().map(|l| l.line).collect();
        assert!(lines.contains(&"hello".to_string()));
        assert!(lines.contains(&"oops".to_string()));
        assert_eq!(lines.last().unwrap(), "process exited with code 3");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let (sup, _rx) = supervisor(Duration::from_secs(1), None);
        let plan = CommandPlan::new("/nonexistent/steamcmd.sh");
        let err = sup
            .start(JobId::new(), &plan, Arc::new(JobLog::new(10)))
            .unwrap_err();
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn cancel_waits_for_reap() {
        let (sup, mut rx) = supervisor(Duration::from_secs(5), None);
        let handle = sup
            .start(JobId::new(), &sh("exec sleep 30"), Arc::new(JobLog::new(10)))
            .unwrap();

        handle.cancel(CancelReason::Requested).await;
        assert!(handle.is_stopped());

        let report = rx.recv().await.unwrap();
        assert_eq!(
            report.outcome.classify(),
            Termination::Cancelled(CancelReason::Requested)
        );
        assert!(!report.outcome.forced_kill);
        assert!(!handle.request_cancel(CancelReason::TimedOut));
    }

    #[tokio::test]
    async fn stubborn_process_is_killed_after_grace() {
        let (sup, mut rx) = supervisor(Duration::from_millis(200), None);
        let handle = sup
            .start(
                JobId::new(),
                &sh("trap '' TERM; exec sleep 30"),
                Arc::new(JobLog::new(10)),
            )
            .unwrap();
        sleep(Duration::from_millis(100)).await;
        handle.cancel(CancelReason::Requested).await;

        let report = rx.recv().await.unwrap();
        assert!(report.outcome.forced_kill);
        assert_eq!(report.outcome.classify().status(), steamdl_core::JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn timeout_cancels_with_timed_out_reason() {
        let (sup, mut rx) = supervisor(Duration::from_secs(1), Some(Duration::from_millis(150)));
        sup.start(JobId::new(), &sh("exec sleep 30"), Arc::new(JobLog::new(10)))
            .unwrap();

        let report = rx.recv().await.unwrap();
        assert_eq!(
            report.outcome.classify(),
            Termination::Cancelled(CancelReason::TimedOut)
        );
    }
}
