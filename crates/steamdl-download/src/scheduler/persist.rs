//! Ordered persistence writer.
//!
//! Record changes are queued from inside the state lock and written by one
//! task, so the repository sees them in commit order without the lock being
//! held across I/O.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use steamdl_core::{Job, JobId, JobStateRepositoryPort};

pub(super) enum PersistOp {
    Save(Box<Job>),
    Remove(JobId),
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub(super) struct PersistHandle {
    tx: mpsc::UnboundedSender<PersistOp>,
}

impl PersistHandle {
    pub fn spawn(repo: Arc<dyn JobStateRepositoryPort>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PersistOp>();
        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                match op {
                    PersistOp::Save(job) => {
                        if let Err(e) = repo.save(&job).await {
                            warn!(target: "steamdl.persist", job_id = %job.id, error = %e, "failed to persist job");
                        }
                    }
                    PersistOp::Remove(id) => {
                        if let Err(e) = repo.remove(&id).await {
                            warn!(target: "steamdl.persist", job_id = %id, error = %e, "failed to remove persisted job");
                        }
                    }
                    PersistOp::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!(target: "steamdl.persist", "persistence writer exiting");
        });
        Self { tx }
    }

    pub fn save(&self, job: &Job) {
        let _ = self.tx.send(PersistOp::Save(Box::new(job.clone())));
    }

    pub fn remove(&self, id: JobId) {
        let _ = self.tx.send(PersistOp::Remove(id));
    }

    /// Wait until everything queued so far has been written.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(PersistOp::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}
