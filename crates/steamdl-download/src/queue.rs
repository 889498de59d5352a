//! Admission queue.
//!
//! FIFO of queued job ids in submission order. Pure sync type; the
//! scheduler holds it under its state lock.

use std::collections::VecDeque;

use steamdl_core::JobId;

#[derive(Debug, Default)]
pub struct AdmissionQueue {
    pending: VecDeque<JobId>,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: JobId) {
        if !self.contains(&id) {
            self.pending.push_back(id);
        }
    }

    /// Oldest queued job.
    pub fn pop(&mut self) -> Option<JobId> {
        self.pending.pop_front()
    }

    /// Remove `id` wherever it is. Returns whether it was queued.
    pub fn remove(&mut self, id: &JobId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|queued| queued != id);
        self.pending.len() < before
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.pending.contains(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
