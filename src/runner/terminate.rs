//! Forced termination of a child and everything it started.
//!
//! On Unix the child is spawned as the leader of its own process group,
//! so signalling the negative pid reaches the whole tree. Elsewhere only
//! the direct child can be killed.

use std::time::Duration;

use tokio::process::Child;
use tracing::{debug, warn};

/// Sends SIGKILL to the process group led by `pid`.
///
/// Returns false if the group no longer exists.
#[cfg(unix)]
pub fn kill_group(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => {
            debug!("Sent SIGKILL to process group {pid}");
            true
        }
        Err(Errno::ESRCH) => false,
        Err(e) => {
            warn!("Failed to signal process group {pid}: {e}");
            false
        }
    }
}

#[cfg(not(unix))]
pub fn kill_group(_pid: u32) -> bool {
    false
}

/// True if any process is still in the group led by `pid` (signal 0).
#[cfg(unix)]
pub fn group_exists(pid: u32) -> bool {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    killpg(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
pub fn group_exists(_pid: u32) -> bool {
    false
}

/// Kills a still-running child and waits up to `grace` for it to be reaped.
///
/// Returns true if the child was confirmed dead within the grace period.
pub async fn kill_and_reap(child: &mut Child, grace: Duration) -> bool {
    let signalled = child.id().map(kill_group).unwrap_or(false);
    if !signalled {
        // No group to signal (non-Unix, or the group vanished): fall back
        // to the direct child.
        if let Err(e) = child.start_kill() {
            debug!("start_kill failed: {e}");
        }
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!("Killed child reaped ({status})");
            true
        }
        Ok(Err(e)) => {
            warn!("Waiting for killed child failed: {e}");
            false
        }
        Err(_) => {
            warn!("Killed child not reaped within {}ms", grace.as_millis());
            false
        }
    }
}
