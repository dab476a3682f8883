//! Logging setup
//!
//! Two outputs:
//! - stderr at INFO, without targets
//! - `<log dir>/offsite-backup.log.<date>`, rotated daily, at the configured level
//!
//! `RUST_LOG` overrides both filters.

use crate::config::{expand_tilde, LogSettings};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "offsite-backup.log";

/// Where and how verbosely a process logs
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_directory: PathBuf,
    /// File output level; the console stays at INFO
    pub log_level: Level,
    /// Rotated files kept after startup cleanup
    pub max_files: u32,
}

impl LoggingConfig {
    /// Build from the `[logging]` section. Unknown level names fall back to INFO.
    pub fn from_settings(settings: &LogSettings) -> Self {
        let name = settings.level.to_lowercase();
        let level = match name.as_str() {
            "warning" => Level::WARN,
            other => Level::from_str(other).unwrap_or(Level::INFO),
        };

        Self {
            log_directory: expand_tilde(&settings.directory),
            log_level: level,
            max_files: settings.max_files,
        }
    }

    /// Path prefix of the rotated log files
    pub fn log_file(&self) -> PathBuf {
        self.log_directory.join(LOG_FILE_PREFIX)
    }
}

/// Install the file and console subscribers.
///
/// Keep the returned guard alive until exit; dropping it flushes the file
/// writer.
pub fn init_logging(config: &LoggingConfig) -> Result<LogGuard> {
    let log_dir = &config.log_directory;
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;

    let (file_writer, file_guard) = tracing_appender::non_blocking(RollingFileAppender::new(
        Rotation::DAILY,
        log_dir,
        LOG_FILE_PREFIX,
    ));

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(level_filter(config.log_level));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(level_filter(Level::INFO));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install the logging subscriber")?;

    prune_rotated_logs(log_dir, config.max_files)?;

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}

fn level_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Keep the `max_files` newest rotated logs. Rotated names end in their
/// date, so name order is age order.
fn prune_rotated_logs(log_dir: &Path, max_files: u32) -> Result<()> {
    let mut names: Vec<String> = fs::read_dir(log_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with(LOG_FILE_PREFIX))
        .collect();
    names.sort_unstable_by(|a, b| b.cmp(a));

    for name in names.iter().skip(max_files as usize) {
        let path = log_dir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed old log file: {:?}", path),
            Err(e) => warn!("Failed to remove old log file {:?}: {}", path, e),
        }
    }

    Ok(())
}

/// Flushes the file writer when dropped
pub struct LogGuard {
    _file_guard: WorkerGuard,
}
