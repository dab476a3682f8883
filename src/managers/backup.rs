//! Backup manager - orchestrates a backup run
//!
//! `NotifyStart -> [MaintenanceOn] -> [DumpDatabases] -> Archive -> Transfer
//! -> [PruneRemote] -> ClearLocalDirs -> [MirrorSync] -> [MaintenanceOff]
//! -> NotifyComplete`
//!
//! Only local filesystem errors (creating or clearing required directories)
//! abort a run. Everything else is recorded in the [`RunReport`] and the run
//! carries on.

use crate::config::{CleanupPolicy, ContentManagementConfig, RunConfig};
use crate::managers::notification::{completed_message, started_message, Notifier};
use crate::managers::report::{RunReport, Stage};
use crate::stages::archive::{create_archive, run_dir_name};
use crate::stages::dump::dumper_for;
use crate::stages::maintenance::set_maintenance_mode;
use crate::stages::retention::{prune, split_family, RemoteTree};
use crate::stages::transfer::{mirror_sync, remote_join, upload_run};
use crate::utils::executor::CommandExecutor;
use crate::utils::locker::RunLock;
use crate::utils::ssh::{RemoteSession, RemoteTarget};
use crate::utils::timestamp::RunStamp;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// One execution of the pipeline
#[derive(Debug, Clone)]
pub struct BackupRun {
    pub stamp: RunStamp,
    /// `backup_<server>_<stamp>`, local and remote
    pub log_dir_name: String,
    pub archive_path: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl BackupRun {
    pub fn new(server: &str, stamp: RunStamp) -> Self {
        Self {
            log_dir_name: run_dir_name(server, &stamp),
            stamp,
            archive_path: None,
            log_file: None,
        }
    }
}

pub struct BackupManager<E: CommandExecutor, N: Notifier> {
    config: RunConfig,
    executor: E,
    notifier: N,
    lock_dir: PathBuf,
}

impl<E: CommandExecutor, N: Notifier> BackupManager<E, N> {
    pub fn new(config: RunConfig, executor: E, notifier: N, lock_dir: &Path) -> Self {
        Self {
            config,
            executor,
            notifier,
            lock_dir: lock_dir.to_path_buf(),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run the pipeline now
    pub fn run(&self) -> Result<RunReport> {
        self.run_at(RunStamp::now())
    }

    /// Run the pipeline with a fixed stamp
    ///
    /// Fails immediately if another run for the same server holds the lock.
    pub fn run_at(&self, stamp: RunStamp) -> Result<RunReport> {
        let lock = RunLock::new(&self.lock_dir, &self.config.server_name);
        lock.hold(|| self.execute(stamp))?
    }

    fn execute(&self, stamp: RunStamp) -> Result<RunReport> {
        let server = &self.config.server_name;
        info!("Starting backup run {} for {}", stamp, server);

        let mut report = RunReport::new(server, stamp);
        self.notify(Stage::NotifyStart, &started_message(server), &mut report);

        let content = self.config.content_management.as_ref();
        match content {
            Some(content) => self.toggle_maintenance(content, true, &mut report),
            None => report.skipped(Stage::MaintenanceOn, "content management disabled"),
        }

        let outcome = self.backup_and_ship(stamp, &mut report);

        // also after a fatal error, the site must not stay in maintenance
        match content {
            Some(content) => self.toggle_maintenance(content, false, &mut report),
            None => report.skipped(Stage::MaintenanceOff, "content management disabled"),
        }

        if let Err(e) = outcome {
            error!("Backup run {} aborted: {:#}", stamp, e);
            return Err(e);
        }

        self.notify(Stage::NotifyComplete, &completed_message(server), &mut report);

        if report.is_clean() {
            info!("Backup run {} completed", stamp);
        } else {
            warn!(
                "Backup run {} completed with {} recovered failure(s)",
                stamp,
                report.failures().len()
            );
        }
        Ok(report)
    }

    /// Dump, archive, transfer, prune, clean up and mirror
    fn backup_and_ship(&self, stamp: RunStamp, report: &mut RunReport) -> Result<()> {
        let config = &self.config;
        let timeouts = &config.timeouts;
        let mut run = BackupRun::new(&config.server_name, stamp);

        match &config.database {
            Some(database) => {
                let dumper = dumper_for(database, &self.executor, timeouts.command());
                let dumps = dumper.dump_all(&config.sql_dir, &stamp)?;
                info!("Dumped {} database(s)", dumps.dumped.len());
                match dumps.failure_summary() {
                    Some(summary) => report.recovered(Stage::DumpDatabases, summary),
                    None => report.succeeded(Stage::DumpDatabases),
                }
            }
            None => report.skipped(Stage::DumpDatabases, "no database configured"),
        }

        let archive = create_archive(
            &self.executor,
            &config.archive_dir,
            &config.server_name,
            &stamp,
            &config.directories,
            timeouts.command(),
        )?;
        run.archive_path = Some(archive.archive_path.clone());
        run.log_file = Some(archive.log_path.clone());
        match &archive.tar_error {
            Some(cause) => report.recovered(Stage::Archive, cause.clone()),
            None => report.succeeded(Stage::Archive),
        }

        let session = match RemoteSession::open(
            &self.executor,
            RemoteTarget::from(&config.remote),
            timeouts.transfer(),
        ) {
            Ok(session) => Some(session),
            Err(e) => {
                error!("{}", e);
                report.recovered(Stage::Transfer, e.to_string());
                None
            }
        };

        let mut transferred = false;
        if let Some(ref session) = session {
            match upload_run(session, &config.remote_destination, &archive, timeouts.transfer()) {
                Ok(_) => {
                    transferred = true;
                    report.succeeded(Stage::Transfer);
                }
                Err(e) => {
                    error!("Transfer failed: {:#}", e);
                    report.recovered(Stage::Transfer, format!("{:#}", e));
                }
            }
        }

        match (&session, config.retention.prune_after_transfer) {
            (_, false) => report.skipped(Stage::PruneRemote, "disabled"),
            (Some(session), true) if transferred => self.prune_own_family(session, report),
            _ => report.skipped(Stage::PruneRemote, "transfer did not succeed"),
        }

        if config.cleanup == CleanupPolicy::OnTransferSuccess && !transferred {
            warn!("Keeping local artifacts of {} since the transfer did not succeed", run.log_dir_name);
            report.skipped(Stage::ClearLocalDirs, "transfer did not succeed");
        } else {
            clear_local_dirs(&[&config.sql_dir, &config.archive_dir])?;
            report.succeeded(Stage::ClearLocalDirs);
        }

        match (config.content_management.as_ref(), &session) {
            (None, _) => report.skipped(Stage::MirrorSync, "content management disabled"),
            (Some(_), None) => report.skipped(Stage::MirrorSync, "no SSH session"),
            (Some(content), Some(session)) => {
                let remote_run_dir = remote_join(&config.remote_destination, &run.log_dir_name);
                match mirror_sync(session, content, &remote_run_dir, timeouts.mirror()) {
                    Ok(()) => report.succeeded(Stage::MirrorSync),
                    Err(e) => {
                        error!("{:#}", e);
                        report.recovered(Stage::MirrorSync, format!("{:#}", e));
                    }
                }
            }
        }

        Ok(())
    }

    fn prune_own_family(&self, session: &RemoteSession<'_, E>, report: &mut RunReport) {
        let Some((root, family)) = split_family(&self.config.remote_destination) else {
            report.skipped(Stage::PruneRemote, "remote destination has no parent folder");
            return;
        };

        let lock = RunLock::new(&self.lock_dir, &format!("prune-{}", family));
        let keep = self.config.retention.keep;
        let result = lock
            .hold(|| prune(&RemoteTree::new(session), root, family, keep))
            .and_then(|r| r);

        match result {
            Ok(pruned) if pruned.is_clean() => {
                info!("Pruned {} old backup(s) of '{}'", pruned.removed.len(), family);
                report.succeeded(Stage::PruneRemote);
            }
            Ok(pruned) => {
                let paths: Vec<_> = pruned.failed.iter().map(|f| f.path.as_str()).collect();
                report.recovered(
                    Stage::PruneRemote,
                    format!("could not remove {}", paths.join(", ")),
                );
            }
            Err(e) => {
                error!("Remote prune failed: {:#}", e);
                report.recovered(Stage::PruneRemote, format!("{:#}", e));
            }
        }
    }

    fn toggle_maintenance(&self, content: &ContentManagementConfig, enable: bool, report: &mut RunReport) {
        let stage = if enable {
            Stage::MaintenanceOn
        } else {
            Stage::MaintenanceOff
        };

        match set_maintenance_mode(&self.executor, content, enable, self.config.timeouts.command()) {
            Ok(()) => report.succeeded(stage),
            Err(e) => {
                error!("{:#}", e);
                report.recovered(stage, format!("{:#}", e));
            }
        }
    }

    /// Delivery problems are logged, never acted upon
    fn notify(&self, stage: Stage, message: &str, report: &mut RunReport) {
        match self.notifier.notify(message) {
            Ok(Some(status)) if (200..300).contains(&status) => report.succeeded(stage),
            Ok(Some(status)) => report.recovered(stage, format!("notification endpoint answered HTTP {}", status)),
            Ok(None) => report.skipped(stage, "no notifier configured"),
            Err(e) => {
                warn!("{:#}", e);
                report.recovered(stage, format!("{:#}", e));
            }
        }
    }
}

/// Empty each directory and recreate it
pub fn clear_local_dirs(dirs: &[&Path]) -> Result<()> {
    for dir in dirs {
        if dir.exists() {
            fs::remove_dir_all(dir).with_context(|| format!("Failed to clear {:?}", dir))?;
        }
        fs::create_dir_all(dir).with_context(|| format!("Failed to recreate {:?}", dir))?;
        info!("Cleared {:?}", dir);
    }
    Ok(())
}
