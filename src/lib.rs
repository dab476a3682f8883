//! Offsite Backup Library
//!
//! Dumps databases, archives directories, ships the archive to a backup host
//! over SSH and keeps only the newest backups there.

pub mod config;
pub mod managers;
pub mod stages;
pub mod utils;

// Re-export commonly used types
pub use config::{load_config, resolve_run_config, Config, RunConfig};
pub use managers::backup::BackupManager;
pub use managers::logging::{init_logging, LogGuard, LoggingConfig};
pub use managers::notification::{Notifier, TelegramNotifier};
pub use managers::report::{RunReport, Stage, StageOutcome};
