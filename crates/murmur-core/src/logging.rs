//! Logging configuration using tracing

use std::path::{Path, PathBuf};

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Initialize the logging subsystem.
///
/// Logs are written to `<data_dir>/logs/` with daily rotation.
/// Log level is controlled by the `MURMUR_LOG` environment variable.
///
/// # Examples
/// ```bash
/// MURMUR_LOG=debug murmur
/// MURMUR_LOG=murmur_bridge=trace murmur
/// ```
pub fn init(data_dir: &Path) -> Result<()> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "murmur.log");

    // Default to info, allow override via MURMUR_LOG
    let env_filter =
        EnvFilter::try_from_env("MURMUR_LOG").unwrap_or_else(|_| EnvFilter::new("murmur=info,warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .init();

    tracing::info!("murmur core starting");
    tracing::info!("Log directory: {}", log_dir.display());

    Ok(())
}

/// Get the log file path for the current day.
pub fn current_log_file(data_dir: &Path) -> PathBuf {
    data_dir.join("logs").join("murmur.log")
}
