//! Mutable scheduler state, guarded by one mutex.
//!
//! Everything that must change atomically lives here: records, gate
//! occupancy, the admission queue and the running set.

use std::collections::HashMap;
use tokio::sync::oneshot;

use steamdl_core::{JobCounts, JobId};
use steamdl_runtime::SupervisorHandle;

use crate::gate::{ConcurrencyGate, GatePermit};
use crate::queue::AdmissionQueue;
use crate::store::JobStore;

/// A job whose subprocess exists.
pub(super) struct ActiveJob {
    pub permit: GatePermit,
    pub handle: SupervisorHandle,
    /// Cancel callers waiting for the terminal record.
    pub waiters: Vec<oneshot::Sender<steamdl_core::Job>>,
}

pub(super) struct SchedulerState {
    pub store: JobStore,
    pub gate: ConcurrencyGate,
    pub queue: AdmissionQueue,
    pub active: HashMap<JobId, ActiveJob>,
    pub accepting: bool,
}

impl SchedulerState {
    pub fn new(store: JobStore, capacity: usize) -> Self {
        Self {
            store,
            gate: ConcurrencyGate::new(capacity),
            queue: AdmissionQueue::new(),
            active: HashMap::new(),
            accepting: true,
        }
    }

    pub fn counts(&self) -> JobCounts {
        self.store.statuses().collect()
    }

    /// Register a waiter for the terminal record of a running job.
    pub fn wait_for(&mut self, id: &JobId) -> Option<oneshot::Receiver<steamdl_core::Job>> {
        let active = self.active.get_mut(id)?;
        let (tx, rx) = oneshot::channel();
        active.waiters.push(tx);
        Some(rx)
    }
}
