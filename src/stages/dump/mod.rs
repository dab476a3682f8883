//! Database dump stage
//!
//! Two sources, selected by the `[database]` mode:
//! - [`DirectDump`]: every database of a local MySQL/MariaDB server
//! - [`ContainerDump`]: listed databases dumped from inside their containers
//!
//! Dumps land in the SQL directory as `<db>_<stamp>.sql`. A failing dump
//! never stops the others and leaves no file behind.

mod container;
mod direct;

pub use container::ContainerDump;
pub use direct::DirectDump;

use crate::config::DatabaseConfig;
use crate::utils::command::CommandLine;
use crate::utils::executor::CommandExecutor;
use crate::utils::timestamp::RunStamp;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

/// A database that could not be dumped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DumpFailure {
    pub database: String,
    pub cause: String,
}

/// What a dump pass produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DumpReport {
    /// Files written, in dump order
    pub dumped: Vec<PathBuf>,
    pub failed: Vec<DumpFailure>,
    /// Set when the list of databases could not be obtained
    pub enumeration_error: Option<String>,
}

impl DumpReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.enumeration_error.is_none()
    }

    /// One line describing what went wrong, for the run report
    pub fn failure_summary(&self) -> Option<String> {
        if self.is_clean() {
            return None;
        }

        let mut parts = Vec::new();
        if let Some(ref e) = self.enumeration_error {
            parts.push(format!("could not list databases: {}", e));
        }
        for failure in &self.failed {
            parts.push(format!("{}: {}", failure.database, failure.cause));
        }
        Some(parts.join("; "))
    }
}

/// Dumps every database of one source into a directory
pub trait DatabaseDump {
    /// Dump into `sql_dir`, naming files with `stamp`.
    ///
    /// Only failing to create `sql_dir` is an error; per-database problems
    /// end up in the report.
    fn dump_all(&self, sql_dir: &Path, stamp: &RunStamp) -> Result<DumpReport>;
}

/// Build the dumper for the configured source
pub fn dumper_for<'a, E: CommandExecutor + ?Sized>(
    config: &'a DatabaseConfig,
    executor: &'a E,
    timeout: Duration,
) -> Box<dyn DatabaseDump + 'a> {
    match config {
        DatabaseConfig::Direct {
            username,
            password,
            exclude,
        } => Box::new(DirectDump::new(executor, username, password, exclude, timeout)),
        DatabaseConfig::Container { targets } => {
            Box::new(ContainerDump::new(executor, targets, timeout))
        }
    }
}

/// `<sql_dir>/<db>_<stamp>.sql`
pub fn dump_path(sql_dir: &Path, database: &str, stamp: &RunStamp) -> PathBuf {
    sql_dir.join(format!("{}_{}.sql", database, stamp))
}

fn prepare_sql_dir(sql_dir: &Path) -> Result<()> {
    fs::create_dir_all(sql_dir)
        .with_context(|| format!("Failed to create SQL dump directory: {:?}", sql_dir))
}

/// Run one dump command into `path`, recording the outcome in `report`.
/// A failed dump's partial file is removed.
fn dump_one<E: CommandExecutor + ?Sized>(
    executor: &E,
    command: &CommandLine,
    database: &str,
    path: PathBuf,
    timeout: Duration,
    report: &mut DumpReport,
) {
    info!("Dumping database '{}' to {:?}", database, path);

    match executor.run_command_to_file(command, &path, false, Some(timeout)) {
        Ok(_) => report.dumped.push(path),
        Err(e) => {
            error!("Failed to dump database '{}': {}", database, e);
            if path.exists() {
                if let Err(remove_err) = fs::remove_file(&path) {
                    error!("Failed to remove partial dump {:?}: {}", path, remove_err);
                }
            }
            report.failed.push(DumpFailure {
                database: database.to_string(),
                cause: e.to_string(),
            });
        }
    }
}
