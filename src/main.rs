use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use offsite_backup::config::{self, Config, DatabaseConfig};
use offsite_backup::managers::backup::BackupManager;
use offsite_backup::managers::logging::{self, LoggingConfig};
use offsite_backup::managers::notification::{Notifier, TelegramNotifier};
use offsite_backup::stages::retention::{self, PruneReport, RemoteTree};
use offsite_backup::utils::cron::{self, CronJob};
use offsite_backup::utils::locker::RunLock;
use offsite_backup::utils::ssh::{RemoteSession, RemoteTarget};
use offsite_backup::utils::RealExecutor;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "offsite-backup")]
#[command(about = "Database dumps, tar archives and SSH offsite copies with retention", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/offsite-backup/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full backup
    Run {
        /// Extra directories to archive, after the configured ones
        directories: Vec<PathBuf>,

        /// Write the run report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Delete all but the newest backups of a family
    Prune {
        /// Backup root holding the family folder (defaults to remote.root)
        #[arg(long)]
        root: Option<String>,

        /// Family folder name (defaults to retention.family)
        #[arg(long)]
        family: Option<String>,

        /// Number of backups to keep (defaults to retention.keep)
        #[arg(long)]
        keep: Option<usize>,

        /// Prune on the remote host over SSH instead of the local filesystem
        #[arg(long)]
        remote: bool,
    },

    /// Validate configuration file and required tools
    Validate,

    /// Send a test notification
    Notify {
        /// Message text
        message: String,
    },

    /// Install crontab entries for runs and prune passes
    SetupCron {
        /// Schedule of the backup run
        #[arg(long, default_value = "0 2 * * *")]
        run_schedule: String,

        /// Schedule of a prune pass (no prune entry if omitted)
        #[arg(long)]
        prune_schedule: Option<String>,

        /// Let the scheduled prune pass work over SSH
        #[arg(long)]
        prune_remote: bool,

        /// Show what would be done without making changes
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;

    // Setup logging with file rotation (must keep guard alive)
    let logging_config = LoggingConfig::from_settings(&config.logging);
    let _log_guard = logging::init_logging(&logging_config)?;

    match cli.command {
        Commands::Run { directories, report } => handle_run(&config, &directories, report),
        Commands::Prune {
            root,
            family,
            keep,
            remote,
        } => handle_prune(&config, root, family, keep, remote),
        Commands::Notify { message } => handle_notify(&config, &message),
        Commands::SetupCron {
            run_schedule,
            prune_schedule,
            prune_remote,
            dry_run,
        } => {
            let mut jobs = vec![CronJob::new("run", &run_schedule, &["run"])];
            if let Some(schedule) = prune_schedule {
                let args: &[&str] = if prune_remote { &["prune", "--remote"] } else { &["prune"] };
                jobs.push(CronJob::new("prune", &schedule, args));
            }
            let log_file = logging_config.log_directory.join("cron.log");
            cron::install_cron_jobs(&jobs, &cli.config, &log_file, dry_run)?;
            if !dry_run {
                println!("✓ Installed {} cron job(s)", jobs.len());
            }
            Ok(())
        }
        Commands::Validate => handle_validate(&config),
    }
}

fn notifier(config: &Config) -> Result<TelegramNotifier> {
    TelegramNotifier::new(config.notifications.clone(), config.timeouts.http())
}

fn handle_run(config: &Config, directories: &[PathBuf], report_path: Option<PathBuf>) -> Result<()> {
    let run_config = config::resolve_run_config(config, directories)?;
    let manager = BackupManager::new(run_config, RealExecutor::new(), notifier(config)?, &config.lock.directory);

    println!("Running backup for server: {}", config.server.name);
    let report = manager.run()?;

    if let Some(path) = report_path {
        fs::write(&path, report.to_json()?)
            .with_context(|| format!("Failed to write run report to {:?}", path))?;
    }

    if report.is_clean() {
        println!("✓ Backup {} completed successfully", report.stamp);
    } else {
        println!("⚠ Backup {} completed with recovered failures:", report.stamp);
        for failure in report.failures() {
            if let offsite_backup::StageOutcome::Recovered { ref cause } = failure.outcome {
                println!("  - {}: {}", failure.stage, cause);
            }
        }
    }
    Ok(())
}

fn handle_prune(
    config: &Config,
    root: Option<String>,
    family: Option<String>,
    keep: Option<usize>,
    remote: bool,
) -> Result<()> {
    let root = root.unwrap_or_else(|| config.remote.root.clone());
    let family = family.unwrap_or_else(|| config.retention.family.clone());
    let keep = keep.unwrap_or(config.retention.keep);
    if keep == 0 {
        anyhow::bail!("--keep must be at least 1");
    }

    let lock = RunLock::new(&config.lock.directory, &format!("prune-{}", family));
    let report: PruneReport = lock.hold(|| -> Result<PruneReport> {
        if remote {
            let executor = RealExecutor::new();
            let session = RemoteSession::open(&executor, RemoteTarget::from(&config.remote), config.timeouts.transfer())?;
            retention::prune(&RemoteTree::new(&session), &root, &family, keep)
        } else {
            retention::prune_local(std::path::Path::new(&root), &family, keep)
        }
    })??;

    println!("Family '{}' under {}:", family, root);
    for survivor in &report.survivors {
        println!("  kept     {}", survivor);
    }
    for removed in &report.removed {
        println!("  removed  {}", removed);
    }
    for failure in &report.failed {
        println!("  FAILED   {} ({})", failure.path, failure.cause);
    }

    if !report.is_clean() {
        anyhow::bail!("{} backup(s) could not be removed", report.failed.len());
    }
    println!("✓ Prune completed");
    Ok(())
}

fn handle_notify(config: &Config, message: &str) -> Result<()> {
    match notifier(config)?.notify(message)? {
        Some(status) => println!("Notification sent, endpoint answered HTTP {}", status),
        None => println!("Notifications are not configured, nothing sent"),
    }
    Ok(())
}

fn handle_validate(config: &Config) -> Result<()> {
    let run_config = config::resolve_run_config(config, &[])?;

    println!("✓ Configuration is valid");
    println!("  Server: {}", run_config.server_name);
    println!("  Remote: {}@{}:{}", run_config.remote.username, run_config.remote.host, run_config.remote_destination);
    println!("  Directories:");
    for dir in &run_config.directories {
        println!("    {}", dir.display());
    }

    let mut tools = vec!["tar", "ssh", "scp", "sshpass"];
    match &config.database {
        Some(DatabaseConfig::Direct { .. }) => tools.extend(["mysql", "mysqldump"]),
        Some(DatabaseConfig::Container { .. }) => tools.push("docker"),
        None => {}
    }
    if config.content_management.is_some() {
        tools.extend(["rsync", "sudo", "php"]);
    }

    let missing: Vec<&str> = tools
        .iter()
        .copied()
        .filter(|tool| match which::which(tool) {
            Ok(found) => {
                println!("  ✓ {} ({})", tool, found.display());
                false
            }
            Err(_) => {
                println!("  ✗ {} not found in PATH", tool);
                true
            }
        })
        .collect();

    if !missing.is_empty() {
        anyhow::bail!("Missing required tools: {}", missing.join(", "));
    }
    Ok(())
}
