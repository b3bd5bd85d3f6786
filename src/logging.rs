use anyhow::anyhow;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "snippet_runner=info";

/// Installs the global fmt subscriber (RUST_LOG=debug for debug mode).
///
/// Fails instead of panicking if a subscriber is already installed, so the
/// embedding binary decides whether that matters.
pub fn init(default_filter: &str) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .try_init()
        .map_err(|e| anyhow!("Cannot install tracing subscriber: {e}"))
}
