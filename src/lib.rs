//! Runs untrusted code snippets in a time-bounded child process.
//!
//! - [`runner`]: launches one interpreter process per call, drains its
//!   output concurrently, and kills the whole process group on deadline.
//! - [`service`]: maps a `{"code": ...}` request onto the runner and the
//!   result onto `{"output": ...}` / `{"error": ...}`.
//! - [`config`]: TOML configuration with `${ENV_VAR}` substitution.
//! - [`logging`]: tracing subscriber setup for the embedding binary.
//!
//! No sandboxing beyond process lifetime is applied here. Filesystem,
//! network and syscall isolation belong to whatever hosts this crate.

pub mod config;
pub mod logging;
pub mod runner;
pub mod service;

#[cfg(all(test, target_os = "linux"))]
mod test_support;

pub use config::{Config, RunnerConfig};
pub use runner::{ExecutionResult, ProcessRunner, Runner};
pub use service::{ExecutionRequest, ExecutionResponse, ExecutionService};
