//! Archive stage: one gzip'd tarball of every configured directory

use crate::utils::command::{CommandError, CommandLine};
use crate::utils::executor::CommandExecutor;
use crate::utils::timestamp::RunStamp;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// `backup_<server>_<stamp>`, the name of the run directory both locally and
/// on the remote host
pub fn run_dir_name(server: &str, stamp: &RunStamp) -> String {
    format!("backup_{}_{}", server, stamp)
}

pub fn archive_file_name(stamp: &RunStamp) -> String {
    format!("backup_all_directories_{}.tar.gz", stamp)
}

pub fn tar_log_file_name(stamp: &RunStamp) -> String {
    format!("tar_backup_log_{}.txt", stamp)
}

/// Where the archive stage put its artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutput {
    /// `<archive-dir>/<log_dir_name>`
    pub run_dir: PathBuf,
    pub log_dir_name: String,
    pub archive_path: PathBuf,
    pub log_file_name: String,
    pub log_path: PathBuf,
    /// Set when tar exited non-zero; the artifacts may be incomplete
    pub tar_error: Option<String>,
}

/// Create the run directory and archive `directories` into it.
///
/// Errors only when there is nothing to archive or the run directory cannot
/// be created. A failing tar is reported through [`ArchiveOutput::tar_error`].
pub fn create_archive<E: CommandExecutor + ?Sized>(
    executor: &E,
    archive_dir: &Path,
    server: &str,
    stamp: &RunStamp,
    directories: &[PathBuf],
    timeout: Duration,
) -> Result<ArchiveOutput> {
    if directories.is_empty() {
        bail!("No directories to archive");
    }

    let log_dir_name = run_dir_name(server, stamp);
    let run_dir = archive_dir.join(&log_dir_name);
    fs::create_dir_all(&run_dir)
        .with_context(|| format!("Failed to create run directory: {:?}", run_dir))?;

    let archive_path = run_dir.join(archive_file_name(stamp));
    let log_file_name = tar_log_file_name(stamp);
    let log_path = run_dir.join(&log_file_name);

    let cmd = CommandLine::new("tar")
        .arg("-zcvf")
        .arg(archive_path.display().to_string())
        .args(directories.iter().map(|d| d.display().to_string()));

    info!("Archiving {} director(ies) into {:?}", directories.len(), archive_path);

    let tar_error = match executor.run_command_to_file(&cmd, &log_path, true, Some(timeout)) {
        Ok(_) => None,
        Err(e) => {
            let cause = describe_tar_failure(&e, &log_path);
            warn!("{}", cause);
            Some(cause)
        }
    };

    Ok(ArchiveOutput {
        run_dir,
        log_dir_name,
        archive_path,
        log_file_name,
        log_path,
        tar_error,
    })
}

/// tar's stderr went into the log file, so point there
fn describe_tar_failure(error: &CommandError, log_path: &Path) -> String {
    match error.exit_code() {
        Some(code) => format!("tar exited with status {} (see {:?})", code, log_path),
        None => format!("tar failed: {}", error),
    }
}
