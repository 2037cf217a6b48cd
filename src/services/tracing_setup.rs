//! Tracing subscriber setup
//!
//! Shared by the CLI and the tests. Filtering follows `RUST_LOG`, defaulting
//! to `info` for this crate.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("workbench=info"))
}

/// Initialize the global subscriber, logging to `log_file_path`.
pub fn init_global(log_file_path: &Path) -> anyhow::Result<()> {
    let log_file = File::create(log_file_path)?;
    build_subscriber(log_file).try_init()?;
    Ok(())
}

/// Initialize the global subscriber, logging to stderr.
pub fn init_stderr() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter())
        .try_init()?;
    Ok(())
}

/// Build a subscriber writing plain-text logs to `log_file`.
pub fn build_subscriber(log_file: File) -> impl tracing::Subscriber + Send + Sync {
    let fmt_layer = fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false);

    tracing_subscriber::registry().with(fmt_layer).with(env_filter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_file_subscriber_writes_warnings() {
        let log_file = NamedTempFile::new().unwrap();
        let subscriber = build_subscriber(log_file.reopen().unwrap());

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "workbench", "store unavailable");
        });

        let contents = std::fs::read_to_string(log_file.path()).unwrap();
        assert!(contents.contains("WARN"), "log: {contents}");
        assert!(contents.contains("store unavailable"));
    }
}
