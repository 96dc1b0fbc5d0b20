//! Tracing setup.
//!
//! Console output goes to stderr through an `EnvFilter`. A `run` also
//! writes a plain-text copy to `accounts/<user>/logs/run-<ts>.log` through a
//! non-blocking writer whose guard must live until the process exits.

use std::path::Path;

use chrono::Local;
use tracing::Span;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::account::Account;
use crate::error::{CadenceError, Result};

/// Default filter directive. `RUST_LOG` takes precedence when set.
#[must_use]
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "cadence=debug,info"
    } else {
        "cadence=info,warn"
    }
}

/// Open `logs_dir/run-<timestamp>.log` behind a non-blocking writer.
pub fn create_run_log_writer(logs_dir: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(logs_dir)?;
    let file_name = format!("run-{}.log", Local::now().format("%Y%m%d-%H%M%S"));
    let appender = tracing_appender::rolling::never(logs_dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init(verbose: bool, file: Option<NonBlocking>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let file_layer = file.map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(writer)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| CadenceError::Other(anyhow::anyhow!("failed to install logger: {e}")))
}

/// Span that tags every log line of a run with the account name.
#[must_use]
pub fn account_span(account: &Account) -> Span {
    tracing::info_span!("account", account = %account.username())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(true), "cadence=debug,info");
        assert_eq!(default_filter(false), "cadence=info,warn");
    }

    #[test]
    fn test_run_log_writer_creates_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let logs_dir = temp_dir.path().join("alice").join("logs");

        let (writer, guard) = create_run_log_writer(&logs_dir).expect("writer");
        drop(writer);
        drop(guard);

        let names: Vec<String> = std::fs::read_dir(&logs_dir)
            .expect("read logs dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("run-"));
        assert!(names[0].ends_with(".log"));
    }

    #[test]
    fn test_run_log_writer_fails_on_bad_dir() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let file = temp_dir.path().join("not-a-dir");
        std::fs::write(&file, "x").expect("write");
        assert!(create_run_log_writer(&file.join("logs")).is_err());
    }
}
