//! Process runtime and OS-level concerns for steamdl.
//!
//! This crate implements the ports defined in `steamdl-core` and owns
//! everything that touches the operating system:
//!
//! - `process` - subprocess supervision, graceful shutdown, per-job log buffers
//! - `steamcmd` - command planning for steamcmd and first-time installation
//! - `system` - host metrics via sysinfo
//! - `state_file` - JSON record persistence

pub mod process;
pub mod state_file;
pub mod steamcmd;
pub mod system;

pub use process::{
    ExitReport, JobLog, LogLine, LogPage, LogStream, ProcessSupervisor, SpawnError,
    SupervisorHandle, shutdown_child,
};
pub use state_file::JsonStateFileRepository;
pub use steamcmd::{InstallError, STEAMCMD_ARCHIVE_URL, SteamCmd, ensure_installed};
pub use system::SysinfoProbe;
