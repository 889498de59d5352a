//! Subprocess supervision infrastructure.
//!
//! # Structure
//!
//! - `ProcessSupervisor` / `SupervisorHandle` - spawn, supervise and cancel one job process
//! - `JobLog` - bounded per-job output ring with live followers and a spill file
//! - `shutdown_child` - SIGTERM → SIGKILL escalation with bounded reaping
//! - `parse_progress` - steamcmd progress line parsing

mod log;
mod progress;
mod shutdown;
mod stream;
mod supervisor;

pub use log::{JobLog, LogLine, LogPage, LogStream};
pub use progress::parse_progress;
pub use shutdown::{Shutdown, shutdown_child};
pub use supervisor::{ExitReport, ProcessSupervisor, SpawnError, SupervisorHandle};
