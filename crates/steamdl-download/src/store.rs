//! Job record store.
//!
//! Sync type with no internal locking: the scheduler owns it inside its
//! single state mutex. Records keep insertion order.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::path::PathBuf;
use std::sync::Arc;

use steamdl_core::{Credentials, Job, JobError, JobId, JobSpec, JobStatus};
use steamdl_runtime::JobLog;

/// Directory under each job dir that steamcmd installs into.
pub const CONTENT_DIR: &str = "content";

/// A job plus what must never leave the process: its live log and secrets.
pub struct JobRecord {
    pub job: Job,
    pub log: Arc<JobLog>,
    pub credentials: Option<Credentials>,
}

impl JobRecord {
    /// Serializable view with live progress filled in.
    pub fn snapshot(&self) -> Job {
        let mut job = self.job.clone();
        job.progress = self.log.progress();
        job
    }
}

pub struct JobStore {
    records: IndexMap<JobId, JobRecord>,
    storage_root: PathBuf,
    max_log_lines: usize,
}

impl JobStore {
    pub fn new(storage_root: impl Into<PathBuf>, max_log_lines: usize) -> Self {
        Self {
            records: IndexMap::new(),
            storage_root: storage_root.into(),
            max_log_lines,
        }
    }

    /// Validate `spec` and insert a new `queued` record.
    ///
    /// Nothing is stored when validation fails.
    pub fn create(&mut self, spec: JobSpec, now: DateTime<Utc>) -> Result<JobId, JobError> {
        let validated = spec.validate()?;
        let id = JobId::new();
        let destination = self.storage_root.join(id.to_string()).join(CONTENT_DIR);
        let job = Job::new(id, &validated, destination, now);
        self.records.insert(
            id,
            JobRecord {
                job,
                log: Arc::new(JobLog::new(self.max_log_lines)),
                credentials: validated.credentials,
            },
        );
        Ok(id)
    }

    /// Insert a record loaded from persistence. Its log starts empty.
    pub fn restore(&mut self, job: Job) {
        let id = job.id;
        self.records.insert(
            id,
            JobRecord {
                job,
                log: Arc::new(JobLog::new(self.max_log_lines)),
                credentials: None,
            },
        );
    }

    pub fn get(&self, id: &JobId) -> Result<Job, JobError> {
        self.record(id).map(JobRecord::snapshot)
    }

    pub fn record(&self, id: &JobId) -> Result<&JobRecord, JobError> {
        self.records.get(id).ok_or_else(|| JobError::not_found(id))
    }

    /// All jobs in insertion order.
    pub fn list(&self) -> Vec<Job> {
        self.records.values().map(JobRecord::snapshot).collect()
    }

    pub fn statuses(&self) -> impl Iterator<Item = JobStatus> + '_ {
        self.records.values().map(|r| r.job.status)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Apply `mutation` to a copy of the job and commit it if the status
    /// change (if any) is an edge of the status graph.
    ///
    /// Secrets are dropped once the job is terminal.
    pub fn update(
        &mut self,
        id: &JobId,
        mutation: impl FnOnce(&mut Job),
    ) -> Result<Job, JobError> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| JobError::not_found(id))?;

        let mut next = record.job.clone();
        mutation(&mut next);

        if next.id != record.job.id {
            return Err(JobError::internal("job id cannot change"));
        }
        let from = record.job.status;
        if next.status != from && !from.can_transition_to(next.status) {
            return Err(JobError::conflict(
                id,
                from,
                format!("cannot move to {}", next.status),
            ));
        }

        if next.is_terminal() {
            record.credentials = None;
        }
        record.job = next;
        Ok(record.snapshot())
    }

    /// Remove a terminal record.
    pub fn delete(&mut self, id: &JobId) -> Result<Job, JobError> {
        let record = self.record(id)?;
        if !record.job.is_terminal() {
            return Err(JobError::conflict(
                id,
                record.job.status,
                "only finished jobs can be removed",
            ));
        }
        self.records
            .shift_remove(id)
            .map(|r| r.snapshot())
            .ok_or_else(|| JobError::not_found(id))
    }

    /// Evict the oldest terminal records beyond `max_history`.
    ///
    /// Returns the evicted ids. Non-terminal records are never evicted.
    pub fn prune_history(&mut self, max_history: usize) -> Vec<JobId> {
        let terminal: Vec<JobId> = self
            .records
            .values()
            .filter(|r| r.job.is_terminal())
            .map(|r| r.job.id)
            .collect();

        let excess = terminal.len().saturating_sub(max_history);
        let evicted: Vec<JobId> = terminal.into_iter().take(excess).collect();
        for id in &evicted {
            self.records.shift_remove(id);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steamdl_core::{CancelReason, Termination};

    fn store() -> JobStore {
        JobStore::new("/srv/steam", 100)
    }

    fn finish(store: &mut JobStore, id: &JobId) {
        store
            .update(id, |j| {
                j.finish(&Termination::Cancelled(CancelReason::Requested), None, Utc::now());
            })
            .unwrap();
    }

    #[test]
    fn create_reflects_submission() {
        let mut store = store();
        let spec = JobSpec {
            validate: true,
            beta: Some("beta1".into()),
            ..JobSpec::anonymous("740")
        };
        let id = store.create(spec, Utc::now()).unwrap();
        let job = store.get(&id).unwrap();

        assert_eq!(job.target.app_id(), 740);
        assert!(job.options.validate);
        assert_eq!(job.options.beta.as_deref(), Some("beta1"));
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(
            job.destination,
            PathBuf::from("/srv/steam").join(id.to_string()).join("content")
        );
    }

    #[test]
    fn invalid_spec_creates_nothing() {
        let mut store = store();
        assert!(matches!(
            store.create(JobSpec::anonymous(""), Utc::now()),
            Err(JobError::InvalidSpec { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn list_keeps_insertion_order() {
        let mut store = store();
        let ids: Vec<JobId> = (1..=3)
            .map(|n| store.create(JobSpec::anonymous(n.to_string()), Utc::now()).unwrap())
            .collect();
        let listed: Vec<JobId> = store.list().into_iter().map(|j| j.id).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn invalid_transition_is_rejected_and_record_untouched() {
        let mut store = store();
        let id = store.create(JobSpec::anonymous("740"), Utc::now()).unwrap();
        finish(&mut store, &id);
        let before = store.get(&id).unwrap();

        let err = store
            .update(&id, |j| {
                j.status = JobStatus::Running;
                j.exit_code = Some(1);
            })
            .unwrap_err();
        assert!(matches!(err, JobError::Conflict { status: JobStatus::Cancelled, .. }));
        assert_eq!(store.get(&id).unwrap(), before);
    }

    #[test]
    fn missing_job_is_not_found() {
        let mut store = store();
        let id = JobId::new();
        assert!(matches!(store.get(&id), Err(JobError::NotFound { .. })));
        assert!(matches!(store.update(&id, |_| {}), Err(JobError::NotFound { .. })));
        assert!(matches!(store.delete(&id), Err(JobError::NotFound { .. })));
    }

    #[test]
    fn delete_only_removes_terminal_records() {
        let mut store = store();
        let id = store.create(JobSpec::anonymous("740"), Utc::now()).unwrap();
        assert!(matches!(store.delete(&id), Err(JobError::Conflict { .. })));

        finish(&mut store, &id);
        assert_eq!(store.delete(&id).unwrap().id, id);
        assert!(store.is_empty());
    }

    #[test]
    fn terminal_records_drop_credentials() {
        let mut store = store();
        let spec = JobSpec {
            target: "740".into(),
            username: Some("gaben".into()),
            password: Some("pw".into()),
            ..JobSpec::default()
        };
        let id = store.create(spec, Utc::now()).unwrap();
        assert!(store.record(&id).unwrap().credentials.is_some());
        finish(&mut store, &id);
        assert!(store.record(&id).unwrap().credentials.is_none());
    }

    #[test]
    fn prune_evicts_oldest_terminal_only() {
        let mut store = store();
        let ids: Vec<JobId> = (1..=4)
            .map(|n| store.create(JobSpec::anonymous(n.to_string()), Utc::now()).unwrap())
            .collect();
        // ids[1] stays queued.
        for id in [&ids[0], &ids[2], &ids[3]] {
            finish(&mut store, id);
        }

        let evicted = store.prune_history(1);
        assert_eq!(evicted, vec![ids[0], ids[2]]);
        let remaining: Vec<JobId> = store.list().into_iter().map(|j| j.id).collect();
        assert_eq!(remaining, vec![ids[1], ids[3]]);
    }
}
