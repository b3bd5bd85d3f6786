use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub runner: RunnerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunnerConfig {
    /// Interpreter binary, resolved through PATH
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Fixed argument vector; the snippet is appended as the last argument
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// How long to wait for a killed process to be reaped
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
    /// Per-stream capture cap in bytes. Unbounded when absent.
    #[serde(default)]
    pub max_output_bytes: Option<usize>,
    /// Cap on concurrently running children. Unbounded when absent.
    #[serde(default)]
    pub max_concurrent: Option<usize>,
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_args() -> Vec<String> {
    vec!["-c".to_string()]
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_kill_grace_ms() -> u64 {
    500
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            args: default_args(),
            timeout_ms: default_timeout_ms(),
            kill_grace_ms: default_kill_grace_ms(),
            max_output_bytes: None,
            max_concurrent: None,
        }
    }
}

impl RunnerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    /// Human-readable description of the invocation shape
    pub fn invocation_description(&self) -> String {
        if self.args.is_empty() {
            format!("{} <code>", self.interpreter)
        } else {
            format!("{} {} <code>", self.interpreter, self.args.join(" "))
        }
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file {path}"))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        // Expand environment variables like ${SNIPPET_INTERPRETER}
        let expanded = shellexpand::env(content)?;
        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let runner = &self.runner;
        if runner.interpreter.trim().is_empty() {
            bail!("runner.interpreter must not be empty");
        }
        if runner.timeout_ms == 0 {
            bail!("runner.timeout_ms must be greater than zero");
        }
        if runner.max_concurrent == Some(0) {
            bail!("runner.max_concurrent must be greater than zero when set");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // ── defaults ────────────────────────────────────────

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.runner.interpreter, "python3");
        assert_eq!(config.runner.args, vec!["-c"]);
        assert_eq!(config.runner.timeout(), Duration::from_secs(5));
        assert_eq!(config.runner.kill_grace(), Duration::from_millis(500));
        assert!(config.runner.max_output_bytes.is_none());
        assert!(config.runner.max_concurrent.is_none());
    }

    #[test]
    fn test_partial_runner_section() {
        let config = Config::parse("[runner]\ntimeout_ms = 250\n").unwrap();
        assert_eq!(config.runner.timeout(), Duration::from_millis(250));
        assert_eq!(config.runner.interpreter, "python3");
    }

    #[test]
    fn test_full_runner_section() {
        let config = Config::parse(
            r#"
            [runner]
            interpreter = "node"
            args = ["-e"]
            timeout_ms = 2000
            kill_grace_ms = 100
            max_output_bytes = 4096
            max_concurrent = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.runner.interpreter, "node");
        assert_eq!(config.runner.args, vec!["-e"]);
        assert_eq!(config.runner.max_output_bytes, Some(4096));
        assert_eq!(config.runner.max_concurrent, Some(8));
    }

    // ── validation ──────────────────────────────────────

    #[test]
    fn test_zero_timeout_rejected() {
        let err = Config::parse("[runner]\ntimeout_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("timeout_ms"));
    }

    #[test]
    fn test_empty_interpreter_rejected() {
        let err = Config::parse("[runner]\ninterpreter = \"  \"\n").unwrap_err();
        assert!(err.to_string().contains("interpreter"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(Config::parse("[runner]\nmax_concurrent = 0\n").is_err());
    }

    // ── env substitution & loading ──────────────────────

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("SNIPPET_RUNNER_TEST_INTERP", "/usr/bin/python3");
        let config =
            Config::parse("[runner]\ninterpreter = \"${SNIPPET_RUNNER_TEST_INTERP}\"\n").unwrap();
        assert_eq!(config.runner.interpreter, "/usr/bin/python3");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[runner]\ninterpreter = \"sh\"\nargs = []").unwrap();
        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.runner.interpreter, "sh");
        assert!(config.runner.args.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/snippet-runner.toml").unwrap_err();
        assert!(err.to_string().contains("Cannot read config file"));
    }

    #[test]
    fn test_shipped_example_config_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/runner.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.runner.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_invocation_description() {
        let runner = RunnerConfig::default();
        assert_eq!(runner.invocation_description(), "python3 -c <code>");
    }
}
