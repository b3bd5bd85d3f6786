//! Process-table helpers shared by the test modules.

use std::time::Duration;

use tokio::time::Instant;

/// True while /proc shows `pid` as a live (non-zombie) process.
pub fn is_alive(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // state is the first field after the parenthesised comm
        Ok(stat) => stat
            .rsplit_once(')')
            .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
        Err(_) => false,
    }
}

/// Polls until `pid` is gone or `within` elapses. Orphans are reaped by
/// init asynchronously, so a kill is not visible in /proc immediately.
pub async fn wait_until_dead(pid: i32, within: Duration) -> bool {
    let deadline = Instant::now() + within;
    while is_alive(pid) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    !is_alive(pid)
}
