//! # Logging
//!
//! Tracing subscriber setup for the binary.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::de::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{CmuxError, Result};

/// Install the global subscriber
///
/// `RUST_LOG` wins over `level_override`, which wins over the configured
/// level. When a log file is configured the returned guard must be kept
/// alive until exit so buffered lines are flushed.
pub fn init_logging(
    config: &LoggingConfig,
    level_override: Option<&str>,
) -> Result<Option<WorkerGuard>> {
    let level = level_override.unwrap_or(config.level.as_str());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    match &config.file {
        Some(path) => {
            let (dir, name) = split_log_path(Path::new(path))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .try_init();
            Ok(Some(guard))
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .try_init();
            Ok(None)
        }
    }
}

/// Directory and file name of a log path; a bare name logs to the working directory
fn split_log_path(path: &Path) -> Result<(PathBuf, OsString)> {
    let name = path.file_name().ok_or_else(|| {
        CmuxError::Config(toml::de::Error::custom(format!(
            "log file path '{}' has no file name",
            path.display()
        )))
    })?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, name.to_os_string()))
}
