//! Content-management maintenance mode around the backup window

use crate::config::ContentManagementConfig;
use crate::utils::command::CommandLine;
use crate::utils::executor::CommandExecutor;
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;

/// `sudo -u <occ_user> php <occ_path> maintenance:mode --on|--off`
fn occ_command(content: &ContentManagementConfig, enable: bool) -> CommandLine {
    CommandLine::new("sudo")
        .args(["-u", content.occ_user.as_str()])
        .arg("php")
        .arg(content.occ_path.display().to_string())
        .arg("maintenance:mode")
        .arg(if enable { "--on" } else { "--off" })
}

pub fn set_maintenance_mode<E: CommandExecutor + ?Sized>(
    executor: &E,
    content: &ContentManagementConfig,
    enable: bool,
    timeout: Duration,
) -> Result<()> {
    let state = if enable { "on" } else { "off" };
    info!("Turning maintenance mode {}", state);

    executor
        .run_command(&occ_command(content, enable), Some(timeout))
        .with_context(|| format!("Failed to turn maintenance mode {}", state))?;
    Ok(())
}
