//! Remote transfer stage
//!
//! Copies the run's archive and tar log to `<remote-dest>/<run-dir>/` and,
//! in content-management mode, mirrors the web root next to them.

use super::archive::ArchiveOutput;
use crate::config::ContentManagementConfig;
use crate::utils::command::CommandLine;
use crate::utils::executor::CommandExecutor;
use crate::utils::ssh::RemoteSession;
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;

/// `<remote_dest>/<name>`
pub fn remote_join(remote_dest: &str, name: &str) -> String {
    format!("{}/{}", remote_dest.trim_end_matches('/'), name)
}

/// Upload exactly the archive and its tar log into the run directory on the
/// remote host. Returns the remote run directory.
pub fn upload_run<E: CommandExecutor + ?Sized>(
    session: &RemoteSession<'_, E>,
    remote_dest: &str,
    archive: &ArchiveOutput,
    timeout: Duration,
) -> Result<String> {
    let remote_dir = remote_join(remote_dest, &archive.log_dir_name);

    session
        .ensure_dir(&remote_dir)
        .with_context(|| format!("Failed to prepare remote directory {}", remote_dir))?;

    for file in [&archive.archive_path, &archive.log_path] {
        session
            .upload(file, &remote_dir, timeout)
            .with_context(|| format!("Failed to copy {:?} to {}", file, remote_dir))?;
    }

    info!("Transferred run to {}:{}", session.target().host, remote_dir);
    Ok(remote_dir)
}

/// rsync the web root into `<remote_run_dir>/<mirror_subdir>/`, or straight
/// into the run directory when `mirror_subdir` is empty
pub fn mirror_sync<E: CommandExecutor + ?Sized>(
    session: &RemoteSession<'_, E>,
    content: &ContentManagementConfig,
    remote_run_dir: &str,
    timeout: Duration,
) -> Result<()> {
    let mirror_dir = if content.mirror_subdir.is_empty() {
        remote_run_dir.trim_end_matches('/').to_string()
    } else {
        remote_join(remote_run_dir, &content.mirror_subdir)
    };
    session
        .ensure_dir(&mirror_dir)
        .with_context(|| format!("Failed to prepare mirror directory {}", mirror_dir))?;

    // trailing slash: copy the contents, not the folder itself
    let source = format!("{}/", content.web_root.display().to_string().trim_end_matches('/'));
    let destination = format!("{}:{}/", session.target().destination(), mirror_dir);

    let cmd = CommandLine::new("rsync")
        .args(["-avz", "--compress", "--partial", "--partial-dir=.rsync-partial"])
        .arg(format!("--bwlimit={}", content.bandwidth_limit))
        .args(["-e".to_string(), session.rsync_transport()])
        .arg(source)
        .arg(destination);

    info!(
        "Mirroring {:?} to {} (bandwidth cap {})",
        content.web_root, mirror_dir, content.bandwidth_limit
    );
    session
        .executor()
        .run_command(&cmd, Some(timeout))
        .context("Mirror sync failed")?;

    Ok(())
}
