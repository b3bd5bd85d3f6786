//! Execution service: the one operation exposed to the request layer.
//!
//! Stateless apart from configuration. Concurrent calls share nothing
//! except the optional concurrency semaphore.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::RunnerConfig;
use crate::runner::{ExecutionResult, ProcessRunner, Runner};

/// Error string reported when the deadline elapses.
pub const TIMED_OUT_MESSAGE: &str = "execution timed out";

/// Incoming request body: `{"code": "..."}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionRequest {
    /// A missing field is treated as an empty program.
    #[serde(default)]
    pub code: Option<String>,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
        }
    }
}

/// Response body: exactly one of `{"output": ...}` or `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionResponse {
    Output(String),
    Error(String),
}

impl From<ExecutionResult> for ExecutionResponse {
    fn from(result: ExecutionResult) -> Self {
        match result {
            ExecutionResult::Completed {
                stdout, exit_code: 0, ..
            } => ExecutionResponse::Output(stdout),
            ExecutionResult::Completed { stderr, .. } => ExecutionResponse::Output(stderr),
            ExecutionResult::TimedOut => ExecutionResponse::Error(TIMED_OUT_MESSAGE.to_string()),
            ExecutionResult::LaunchFailed { message } => ExecutionResponse::Error(message),
        }
    }
}

/// Runs snippets with the configured interpreter and deadline.
pub struct ExecutionService<R: Runner = ProcessRunner> {
    config: RunnerConfig,
    runner: R,
    permits: Option<Arc<Semaphore>>,
}

impl ExecutionService<ProcessRunner> {
    pub fn new(config: RunnerConfig) -> Self {
        let runner = ProcessRunner::from_config(&config);
        Self::with_runner(config, runner)
    }
}

impl<R: Runner> ExecutionService<R> {
    pub fn with_runner(config: RunnerConfig, runner: R) -> Self {
        let permits = config
            .max_concurrent
            .map(|n| Arc::new(Semaphore::new(n)));
        Self {
            config,
            runner,
            permits,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs the snippet and maps the outcome to a response. Never fails.
    pub async fn execute(&self, req: ExecutionRequest) -> ExecutionResponse {
        let code = req.code.unwrap_or_default();

        // Held until the child is gone; queueing time is not charged to the deadline
        let _permit = match &self.permits {
            Some(permits) => match permits.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(e) => {
                    warn!("Concurrency limiter closed: {e}");
                    return ExecutionResponse::Error(format!("service unavailable: {e}"));
                }
            },
            None => None,
        };

        debug!(
            code_len = code.len(),
            "Executing snippet via {}",
            self.config.invocation_description()
        );

        let result = self
            .runner
            .run_with_timeout(
                &self.config.interpreter,
                &self.config.args,
                &code,
                self.config.timeout(),
            )
            .await;

        debug!("Execution finished: {}", result.kind());
        result.into()
    }

    /// Parses a JSON request body, executes it, and returns the JSON response.
    pub async fn execute_json(&self, body: &str) -> String {
        let response = match serde_json::from_str::<ExecutionRequest>(body) {
            Ok(req) => self.execute(req).await,
            Err(e) => {
                warn!("Rejected malformed request: {e}");
                ExecutionResponse::Error(format!("invalid request: {e}"))
            }
        };
        response.to_json()
    }
}

impl ExecutionResponse {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            // Serialising a single string field cannot realistically fail
            format!(r#"{{"error":"response serialization failed: {e}"}}"#)
        })
    }
}
