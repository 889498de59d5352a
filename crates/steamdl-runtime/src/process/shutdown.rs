//! Graceful shutdown logic for `tokio::process::Child` with SIGTERM → SIGKILL escalation.
//!
//! Children are spawned as process group leaders, so signals go to the whole
//! group: `steamcmd.sh` forks the real binary and both must stop.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use steamdl_core::config::KILL_REAP_TIMEOUT;
use tokio::process::Child;
use tokio::time::timeout;
use tracing::warn;

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// How a child was brought down.
#[derive(Debug, Clone, Copy)]
pub struct Shutdown {
    pub status: ExitStatus,
    /// SIGKILL (or an immediate kill on non-unix) was needed.
    pub forced: bool,
}

/// Gracefully shut down a child process with SIGTERM, escalating to SIGKILL if needed.
///
/// # Strategy
/// 1. Send SIGTERM to the process group and wait up to `grace`
/// 2. If still running, send SIGKILL to the group
/// 3. Wait (bounded) for reaping
///
/// # Platform behavior
/// - Unix: nix `killpg` for both signals
/// - Other: immediately calls `.kill()` (no graceful shutdown available)
pub async fn shutdown_child(child: &mut Child, grace: Duration) -> io::Result<Shutdown> {
    #[cfg(unix)]
    {
        shutdown_unix(child, grace).await
    }

    #[cfg(not(unix))]
    {
        let _ = grace;
        shutdown_immediate(child).await
    }
}

#[cfg(unix)]
async fn shutdown_unix(child: &mut Child, grace: Duration) -> io::Result<Shutdown> {
    let Some(pid) = child.id() else {
        // Already reaped.
        return child.wait().await.map(|status| Shutdown {
            status,
            forced: false,
        });
    };
    let pgid = Pid::from_raw(
        i32::try_from(pid).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid overflow"))?,
    );

    // Phase 1: SIGTERM with grace period
    if let Err(e) = signal::killpg(pgid, Signal::SIGTERM) {
        if e == nix::errno::Errno::ESRCH {
            return child.wait().await.map(|status| Shutdown {
                status,
                forced: false,
            });
        }
        return Err(io::Error::other(e));
    }

    if let Ok(result) = timeout(grace, child.wait()).await {
        return result.map(|status| Shutdown {
            status,
            forced: false,
        });
    }

    // Phase 2: SIGKILL the whole group
    warn!(pid, grace_secs = grace.as_secs_f64(), "process ignored SIGTERM, sending SIGKILL");
    match signal::killpg(pgid, Signal::SIGKILL) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => return Err(io::Error::other(e)),
    }

    // Phase 3: bounded reap
    reap(child).await
}

#[cfg(not(unix))]
async fn shutdown_immediate(child: &mut Child) -> io::Result<Shutdown> {
    child.start_kill()?;
    reap(child).await
}

async fn reap(child: &mut Child) -> io::Result<Shutdown> {
    match timeout(KILL_REAP_TIMEOUT, child.wait()).await {
        Ok(result) => result.map(|status| Shutdown {
            status,
            forced: true,
        }),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "child was not reaped after SIGKILL",
        )),
    }
}
