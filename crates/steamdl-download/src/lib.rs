//! Job scheduling for steamdl.
//!
//! - `store` - job records in insertion order, with status-graph checks
//! - `gate` - concurrency gate with idempotent permits
//! - `queue` - FIFO admission queue
//! - `scheduler` - the orchestrator tying them to supervised processes
//! - `reporter` - read-only system snapshots

pub mod gate;
pub mod queue;
pub mod reporter;
pub mod scheduler;
pub mod store;

pub use gate::{ConcurrencyGate, GatePermit};
pub use queue::AdmissionQueue;
pub use reporter::StatusReporter;
pub use scheduler::{Deleted, LOG_FILE, Scheduler, SchedulerDeps, SchedulerLoad, StartError};
pub use store::{CONTENT_DIR, JobRecord, JobStore};

// Re-export runtime log types that appear in the scheduler API
pub use steamdl_runtime::{LogLine, LogPage, LogStream};
