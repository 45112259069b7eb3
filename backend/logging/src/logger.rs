//! Structured Logger
//!
//! Console output plus an optional daily-rolling NDJSON file. `RUST_LOG`
//! takes precedence over the configured level.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the file writer flushing. Hold it for the life of the process.
pub type LoggerGuard = Option<WorkerGuard>;

const LOG_FILE_PREFIX: &str = "ocrgate.log";

/// Initialize the global subscriber.
///
/// Calling it a second time is a no-op, which keeps tests and embedded use
/// from fighting over the global dispatcher.
pub fn init_logger(level: &str, log_dir: Option<&Path>) -> Result<LoggerGuard> {
    let env_filter = build_filter(level)?;

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log dir {}", dir.display()))?;
            // Writes NDJSON to `<dir>/ocrgate.log.YYYY-MM-DD`
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    Ok(guard)
}

fn build_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("invalid log level `{level}`")),
    }
}
