use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub local: LocalConfig,
    pub remote: RemoteConfig,
    /// Database source; absent means no dumps
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    /// Content-management (Nextcloud-style) mode; absent means off
    #[serde(default)]
    pub content_management: Option<ContentManagementConfig>,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub logging: LogSettings,
    #[serde(default)]
    pub lock: LockConfig,
}

/// Identity of the server being backed up
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Used in every local and remote artifact name
    pub name: String,
}

/// Local working paths
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalConfig {
    /// Base directory for the staging folders (default: current directory)
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Staging folder for run directories, relative to `work_dir` unless absolute
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,

    /// Folder receiving SQL dumps, relative to `work_dir` unless absolute
    #[serde(default = "default_sql_dir")]
    pub sql_dir: PathBuf,

    /// Additional directories to include in the archive
    #[serde(default)]
    pub directories: Vec<PathBuf>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            archive_dir: default_archive_dir(),
            sql_dir: default_sql_dir(),
            directories: Vec::new(),
        }
    }
}

/// Backup host reached over SSH
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    pub host: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    pub username: String,

    pub password: String,

    /// Root of the backup tree on the remote host
    pub root: String,

    /// Where this server's runs go (default: `<root>/<server name>`)
    #[serde(default)]
    pub destination: Option<String>,
}

/// Database dump source, selected by `mode`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DatabaseConfig {
    /// Enumerate and dump every database of a local server
    Direct {
        username: String,
        password: String,
        /// Databases to skip on top of the system schemas
        #[serde(default)]
        exclude: Vec<String>,
    },
    /// Dump listed databases from inside their containers
    Container { targets: Vec<ContainerDatabase> },
}

/// One database living in a container
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ContainerDatabase {
    /// Container name or id
    pub container: String,
    pub name: String,
    pub user: String,
    pub password: String,
}

/// Live web-content tree that is mirrored and put into maintenance mode
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContentManagementConfig {
    /// Directory mirrored to the remote host
    pub web_root: PathBuf,

    /// Path to the `occ` console script
    pub occ_path: PathBuf,

    /// System user the console runs as
    #[serde(default = "default_occ_user")]
    pub occ_user: String,

    /// Static rsync bandwidth cap (rsync `--bwlimit` syntax)
    #[serde(default = "default_bandwidth_limit")]
    pub bandwidth_limit: String,

    /// Folder inside the remote run directory receiving the mirror
    #[serde(default = "default_mirror_subdir")]
    pub mirror_subdir: String,
}

/// Notification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub telegram_bot_id: String,

    #[serde(default)]
    pub telegram_chat_id: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Skip TLS certificate validation for the bot endpoint
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            telegram_bot_id: String::new(),
            telegram_chat_id: String::new(),
            api_base: default_api_base(),
            accept_invalid_certs: false,
        }
    }
}

impl NotificationConfig {
    pub fn is_configured(&self) -> bool {
        !self.telegram_bot_id.is_empty() && !self.telegram_chat_id.is_empty()
    }
}

/// Remote retention settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Family folder scanned by a standalone prune pass
    #[serde(default = "default_family")]
    pub family: String,

    /// Newest entries kept per family
    #[serde(default = "default_keep")]
    pub keep: usize,

    /// Prune this server's own family right after a successful transfer
    #[serde(default)]
    pub prune_after_transfer: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            family: default_family(),
            keep: default_keep(),
            prune_after_transfer: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupPolicy {
    /// Clear local staging folders after every run
    #[default]
    Always,
    /// Keep local artifacts when the transfer did not succeed
    OnTransferSuccess,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CleanupConfig {
    #[serde(default)]
    pub policy: CleanupPolicy,
}

/// Timeouts for external calls, in seconds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutConfig {
    /// Dumps, archiving, maintenance toggles
    #[serde(default = "default_command_timeout")]
    pub command_seconds: u64,
    /// SSH session setup, remote commands and file copies
    #[serde(default = "default_transfer_timeout")]
    pub transfer_seconds: u64,
    #[serde(default = "default_mirror_timeout")]
    pub mirror_seconds: u64,
    #[serde(default = "default_http_timeout")]
    pub http_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_seconds: default_command_timeout(),
            transfer_seconds: default_transfer_timeout(),
            mirror_seconds: default_mirror_timeout(),
            http_seconds: default_http_timeout(),
        }
    }
}

impl TimeoutConfig {
    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_seconds)
    }

    pub fn transfer(&self) -> Duration {
        Duration::from_secs(self.transfer_seconds)
    }

    pub fn mirror(&self) -> Duration {
        Duration::from_secs(self.mirror_seconds)
    }

    pub fn http(&self) -> Duration {
        Duration::from_secs(self.http_seconds)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogSettings {
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_max_files")]
    pub max_files: u32,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            level: default_log_level(),
            max_files: default_log_max_files(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_directory")]
    pub directory: PathBuf,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            directory: default_lock_directory(),
        }
    }
}

/// Everything one backup run needs, validated and with paths resolved.
/// Built once by [`crate::config::resolve_run_config`] and shared read-only
/// by every stage.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub server_name: String,
    /// Parent of the run-scoped directories (`files_to`)
    pub archive_dir: PathBuf,
    /// Destination of SQL dumps (`mysql`)
    pub sql_dir: PathBuf,
    /// Archived in this order; never empty
    pub directories: Vec<PathBuf>,
    pub remote: RemoteConfig,
    /// Remote folder holding this server's runs
    pub remote_destination: String,
    pub database: Option<DatabaseConfig>,
    pub content_management: Option<ContentManagementConfig>,
    pub notifications: NotificationConfig,
    pub retention: RetentionConfig,
    pub cleanup: CleanupPolicy,
    pub timeouts: TimeoutConfig,
}

// Default value functions

fn default_work_dir() -> PathBuf { PathBuf::from(".") }
fn default_archive_dir() -> PathBuf { PathBuf::from("files_to") }
fn default_sql_dir() -> PathBuf { PathBuf::from("mysql") }
fn default_ssh_port() -> u16 { 22 }
fn default_occ_user() -> String { "www-data".to_string() }
fn default_bandwidth_limit() -> String { "150m".to_string() }
fn default_mirror_subdir() -> String { "nextcloud".to_string() }
fn default_api_base() -> String { "https://api.telegram.org".to_string() }
fn default_family() -> String { "nextcloud-server".to_string() }
fn default_keep() -> usize { 1 }
fn default_command_timeout() -> u64 { 3600 }
fn default_transfer_timeout() -> u64 { 7200 }
fn default_mirror_timeout() -> u64 { 43200 }
fn default_http_timeout() -> u64 { 30 }
fn default_log_directory() -> PathBuf { PathBuf::from("~/logs") }
fn default_log_level() -> String { "info".to_string() }
fn default_log_max_files() -> u32 { 10 }
fn default_lock_directory() -> PathBuf { std::env::temp_dir() }
