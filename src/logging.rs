//! Tracing setup: stderr plus a non-blocking log file.
//!
//! stdout is reserved for command results, so the console layer writes to
//! stderr.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt};

pub const LOG_FILE: &str = "debugpilot.log";

/// `RUST_LOG` wins; otherwise `info`, or `debug` when verbose.
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }))
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must live until
/// the process exits. Without a usable `log_dir` only stderr is written.
pub fn init(verbose: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let file = log_dir.filter(|dir| std::fs::create_dir_all(dir).is_ok()).map(|dir| {
        let appender = tracing_appender::rolling::never(dir, LOG_FILE);
        tracing_appender::non_blocking(appender)
    });

    match file {
        Some((writer, guard)) => {
            let subscriber = Registry::default()
                .with(env_filter(verbose))
                .with(stderr_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_line_number(true),
                );
            tracing::subscriber::set_global_default(subscriber).ok();
            Some(guard)
        }
        None => {
            let subscriber = Registry::default().with(env_filter(verbose)).with(stderr_layer);
            tracing::subscriber::set_global_default(subscriber).ok();
            None
        }
    }
}
