//! Concurrency gate.
//!
//! Bounds how many subprocesses exist at once. Sync type with no internal
//! locking: the scheduler mutates it under the same lock as job status.

use std::collections::HashSet;

/// Proof that one slot is held.
///
/// Releasing twice is a no-op: the permit disarms on first release, and the
/// gate only honours acquisitions it handed out and has not seen back.
#[derive(Debug)]
pub struct GatePermit {
    acquisition: u64,
    armed: bool,
}

impl GatePermit {
    pub const fn is_armed(&self) -> bool {
        self.armed
    }
}

#[derive(Debug)]
pub struct ConcurrencyGate {
    capacity: usize,
    outstanding: HashSet<u64>,
    next_acquisition: u64,
}

impl ConcurrencyGate {
    /// Gate with `capacity` slots. A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            outstanding: HashSet::new(),
            next_acquisition: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn occupied(&self) -> usize {
        self.outstanding.len()
    }

    pub fn available(&self) -> usize {
        self.capacity - self.occupied()
    }

    /// Take a slot if one is free. Never blocks.
    pub fn try_acquire(&mut self) -> Option<GatePermit> {
        if self.outstanding.len() >= self.capacity {
            return None;
        }
        let acquisition = self.next_acquisition;
        self.next_acquisition += 1;
        self.outstanding.insert(acquisition);
        Some(GatePermit {
            acquisition,
            armed: true,
        })
    }

    /// Give the slot back. Returns `true` only for the first release.
    pub fn release(&mut self, permit: &mut GatePermit) -> bool {
        if !permit.armed {
            return false;
        }
        permit.armed = false;
        self.outstanding.remove(&permit.acquisition)
    }
}
