//! Crontab management for scheduled runs and prune passes

use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

const MARKER_PREFIX: &str = "# offsite-backup:";

/// One scheduled invocation of this binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronJob {
    /// Identifies the entry in the crontab (`run`, `prune`)
    pub name: String,
    pub schedule: String,
    /// Subcommand and its arguments
    pub args: Vec<String>,
}

impl CronJob {
    pub fn new(name: &str, schedule: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            schedule: schedule.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn marker(&self) -> String {
        format!("{} {}", MARKER_PREFIX, self.name)
    }

    /// The two crontab lines (marker comment, then the schedule line)
    pub fn render(&self, binary: &Path, config_path: &Path, log_file: &Path) -> String {
        format!(
            "{}\n{} {} --config {} {} >> {} 2>&1",
            self.marker(),
            self.schedule,
            binary.display(),
            config_path.display(),
            self.args.join(" "),
            log_file.display()
        )
    }
}

/// Get the path to the offsite-backup binary
pub fn get_binary_path() -> Result<PathBuf> {
    env::current_exe().context("Failed to get current executable path")
}

/// Get the current crontab
pub fn get_crontab() -> Result<String> {
    let output = Command::new("crontab")
        .arg("-l")
        .output()
        .context("Failed to execute crontab -l")?;

    if !output.status.success() {
        // Empty crontab returns non-zero, check stderr
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("no crontab") {
            return Ok(String::new());
        }
        anyhow::bail!("Failed to read crontab: {}", stderr);
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Set the crontab content
pub fn set_crontab(content: &str) -> Result<()> {
    use std::io::Write;

    let mut child = Command::new("crontab")
        .arg("-")
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .context("Failed to spawn crontab")?;

    match child.stdin.take() {
        Some(mut stdin) => stdin
            .write_all(content.as_bytes())
            .context("Failed to write to crontab stdin")?,
        None => anyhow::bail!("Failed to open crontab stdin"),
    }

    let output = child.wait_with_output().context("Failed to wait for crontab")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Crontab command failed: {}", stderr);
    }

    info!("Crontab updated successfully");
    Ok(())
}

/// Replace the entry carrying `marker` (comment line plus the line after it)
/// with `entry`, or append `entry` if there is none
pub fn upsert_entry(existing: &str, marker: &str, entry: &str) -> String {
    let mut lines = Vec::new();
    let mut skip_next = false;

    for line in existing.lines() {
        if line.trim_end() == marker {
            skip_next = true;
            continue;
        }
        if skip_next {
            skip_next = false;
            continue;
        }
        lines.push(line);
    }

    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    lines.push(entry);
    lines.join("\n") + "\n"
}

/// Install or update cron jobs. With `dry_run` the entries are only logged.
pub fn install_cron_jobs(
    jobs: &[CronJob],
    config_path: &Path,
    log_file: &Path,
    dry_run: bool,
) -> Result<()> {
    for job in jobs {
        if !validate_cron_schedule(&job.schedule) {
            anyhow::bail!("Invalid cron schedule for '{}': {:?}", job.name, job.schedule);
        }
    }

    let binary_path = get_binary_path()?;

    if dry_run {
        for job in jobs {
            info!(
                "[DRY RUN] Would install cron job:\n{}",
                job.render(&binary_path, config_path, log_file)
            );
        }
        return Ok(());
    }

    let mut content = get_crontab()?;
    for job in jobs {
        let marker = job.marker();
        if content.lines().any(|l| l.trim_end() == marker) {
            warn!("Cron job '{}' already exists, updating...", job.name);
        }
        content = upsert_entry(&content, &marker, &job.render(&binary_path, config_path, log_file));
        info!("Scheduled '{}' at {}", job.name, job.schedule);
    }

    set_crontab(&content)
}

/// Validate cron schedule syntax
pub fn validate_cron_schedule(schedule: &str) -> bool {
    // Basic validation: should have 5 fields
    schedule.split_whitespace().count() == 5
}
