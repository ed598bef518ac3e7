//! Tracing initialisation for the testsmith binary.
//!
//! Filtering comes from `TESTSMITH_LOG` when set, otherwise `info` (or `debug`
//! with `--verbose`). Console output goes to stderr so it never mixes with
//! JSON printed on stdout. When a log directory is given, a daily-rolling
//! file layer is added as well.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

pub const LOG_ENV: &str = "TESTSMITH_LOG";

fn env_filter(verbose: bool) -> EnvFilter {
    let fallback = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Initialise the global subscriber.
///
/// The returned guard flushes the file writer on drop; hold it for the life
/// of the process. Only the first call in a process takes effect.
pub fn init_tracing(verbose: bool, json: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let console = if json {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .boxed()
    };

    let (file_layer, guard) = match log_dir.filter(|d| d.is_dir()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "testsmith.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .json()
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(console)
        .with(file_layer)
        .try_init()
        .ok();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_is_idempotent_and_returns_file_guard() {
        let dir = tempdir().unwrap();
        let guard = init_tracing(false, false, Some(dir.path()));
        assert!(guard.is_some());
        // Second call must not panic even though the global subscriber is set.
        let again = init_tracing(true, true, None);
        assert!(again.is_none());
        tracing::info!(test = "telemetry", "log line after init");
    }

    #[test]
    fn test_missing_log_dir_skips_file_layer() {
        let dir = tempdir().unwrap();
        let guard = init_tracing(false, false, Some(&dir.path().join("absent")));
        assert!(guard.is_none());
    }
}
