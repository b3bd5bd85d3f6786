//! Process runner: launches one child, captures its output, and enforces
//! a wall-clock deadline.
//!
//! The snippet is passed as a single argv entry. No shell is involved, so
//! metacharacters in the snippet reach the interpreter as literal text.

pub mod capture;
pub mod terminate;

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::RunnerConfig;

/// Terminal outcome of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// The process exited before the deadline.
    Completed {
        stdout: String,
        stderr: String,
        exit_code: i32,
    },
    /// The deadline elapsed and the process group was killed.
    TimedOut,
    /// The process could not be started.
    LaunchFailed { message: String },
}

impl ExecutionResult {
    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionResult::Completed { .. } => "completed",
            ExecutionResult::TimedOut => "timed_out",
            ExecutionResult::LaunchFailed { .. } => "launch_failed",
        }
    }
}

/// Anything that can run a program against a snippet under a deadline.
///
/// `ProcessRunner` is the real implementation; the service only depends on
/// this trait.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[String],
        code: &str,
        deadline: Duration,
    ) -> ExecutionResult;
}

/// Runs each request in a fresh OS process. Holds only configuration.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    kill_grace: Duration,
    max_output_bytes: Option<usize>,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::from_config(&RunnerConfig::default())
    }
}

impl ProcessRunner {
    pub fn new(kill_grace: Duration, max_output_bytes: Option<usize>) -> Self {
        Self {
            kill_grace,
            max_output_bytes,
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(config.kill_grace(), config.max_output_bytes)
    }

    async fn run(&self, program: &str, args: &[String], code: &str, deadline: Duration) -> ExecutionResult {
        let started = Instant::now();

        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(code)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to start {program}: {e}");
                return ExecutionResult::LaunchFailed {
                    message: format!("failed to start '{program}': {e}"),
                };
            }
        };

        // Captured now: tokio forgets the pid once the child is reaped
        let pid = child.id();
        debug!(pid, code_len = code.len(), "Child spawned");

        let stdout = capture::spawn_sink(child.stdout.take(), self.max_output_bytes);
        let stderr = capture::spawn_sink(child.stderr.take(), self.max_output_bytes);

        match tokio::time::timeout(deadline, child.wait()).await {
            Ok(Ok(status)) => {
                // Reclaim background descendants still holding the pipes open.
                // The leader is reaped, so the group id stays reserved only while
                // members remain; between the reap and the check a pid wrap could
                // reassign it. The existence check narrows that window, not closes it.
                if let Some(pid) = pid {
                    if terminate::group_exists(pid) && terminate::kill_group(pid) {
                        debug!("Killed leftover descendants of {pid}");
                    }
                }

                // One cutoff for both streams so the call never outlives
                // deadline + grace, whatever still holds the pipes
                let cutoff = started + deadline + self.kill_grace;
                let (stdout, stderr) = tokio::join!(
                    stdout.finish_by(cutoff, "stdout"),
                    stderr.finish_by(cutoff, "stderr"),
                );
                let exit_code = exit_code(status);

                info!(
                    exit_code,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    stdout_len = stdout.bytes.len(),
                    stderr_len = stderr.bytes.len(),
                    "Execution completed"
                );
                if stdout.truncated || stderr.truncated {
                    debug!("Output truncated to {:?} bytes per stream", self.max_output_bytes);
                }

                ExecutionResult::Completed {
                    stdout: stdout.into_string(),
                    stderr: stderr.into_string(),
                    exit_code,
                }
            }
            Ok(Err(e)) => {
                warn!("Waiting on child failed: {e}");
                terminate::kill_and_reap(&mut child, self.kill_grace).await;
                stdout.abort();
                stderr.abort();
                ExecutionResult::LaunchFailed {
                    message: format!("failed to wait for '{program}': {e}"),
                }
            }
            Err(_) => {
                warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    "Deadline exceeded, killing process group"
                );
                terminate::kill_and_reap(&mut child, self.kill_grace).await;
                stdout.abort();
                stderr.abort();
                ExecutionResult::TimedOut
            }
        }
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[String],
        code: &str,
        deadline: Duration,
    ) -> ExecutionResult {
        let span = info_span!("execution", id = %Uuid::new_v4(), program);
        self.run(program, args, code, deadline).instrument(span).await
    }
}

/// Exit code, or 128 + signal number for a signalled process.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
