//! Fluent API for building test configurations
//!
//! Every path the pipeline writes to (staging folders, logs, locks) lives in
//! the builder's temporary directory.

use offsite_backup::config::{
    CleanupConfig, CleanupPolicy, Config, ContainerDatabase, ContentManagementConfig,
    DatabaseConfig, LocalConfig, LockConfig, LogSettings, NotificationConfig, RemoteConfig,
    RetentionConfig, ServerConfig, TimeoutConfig,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Builder for creating test configurations
pub struct ConfigBuilder {
    temp_dir: TempDir,
    config: Config,
}

impl ConfigBuilder {
    /// A config with no database, no content management and no directories
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let work_dir = temp_dir.path().join("work");
        fs::create_dir_all(&work_dir).expect("Failed to create work dir");

        let log_directory = temp_dir.path().join("logs");
        fs::create_dir_all(&log_directory).expect("Failed to create log directory");

        let lock_directory = temp_dir.path().join("locks");
        fs::create_dir_all(&lock_directory).expect("Failed to create lock directory");

        let config = Config {
            server: ServerConfig {
                name: "test-server".to_string(),
            },
            local: LocalConfig {
                work_dir,
                ..LocalConfig::default()
            },
            remote: RemoteConfig {
                host: "backup.example.net".to_string(),
                port: 22,
                username: "backup".to_string(),
                password: "secret".to_string(),
                root: "/media/backups".to_string(),
                destination: None,
            },
            database: None,
            content_management: None,
            notifications: NotificationConfig::default(),
            retention: RetentionConfig::default(),
            cleanup: CleanupConfig::default(),
            timeouts: TimeoutConfig::default(),
            logging: LogSettings {
                directory: log_directory,
                level: "debug".to_string(),
                max_files: 3,
            },
            lock: LockConfig {
                directory: lock_directory,
            },
        };

        Self { temp_dir, config }
    }

    /// A config archiving one existing `site` directory
    pub fn minimal() -> Self {
        let builder = Self::new();
        let site = builder.temp_dir.path().join("site");
        fs::create_dir_all(&site).expect("Failed to create site dir");
        fs::write(site.join("index.html"), "<html></html>").expect("Failed to write site file");
        builder.with_directory(site)
    }

    /// Temporary directory everything is rooted in
    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn server(mut self, name: &str) -> Self {
        self.config.server.name = name.to_string();
        self
    }

    pub fn with_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.local.directories.push(dir.into());
        self
    }

    pub fn remote_root(mut self, root: &str) -> Self {
        self.config.remote.root = root.to_string();
        self
    }

    pub fn remote_destination(mut self, destination: &str) -> Self {
        self.config.remote.destination = Some(destination.to_string());
        self
    }

    /// Dump every database of a local server
    pub fn with_direct_database(mut self, exclude: &[&str]) -> Self {
        self.config.database = Some(DatabaseConfig::Direct {
            username: "root".to_string(),
            password: "dbpass".to_string(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    /// Dump one database per `(container, database)` pair
    pub fn with_container_databases(mut self, targets: &[(&str, &str)]) -> Self {
        self.config.database = Some(DatabaseConfig::Container {
            targets: targets
                .iter()
                .map(|(container, name)| ContainerDatabase {
                    container: container.to_string(),
                    name: name.to_string(),
                    user: "app".to_string(),
                    password: "apppass".to_string(),
                })
                .collect(),
        });
        self
    }

    pub fn with_content_management(mut self) -> Self {
        let web_root = self.temp_dir.path().join("www");
        fs::create_dir_all(&web_root).expect("Failed to create web root");

        self.config.content_management = Some(ContentManagementConfig {
            occ_path: web_root.join("occ"),
            web_root,
            occ_user: "www-data".to_string(),
            bandwidth_limit: "150m".to_string(),
            mirror_subdir: "nextcloud".to_string(),
        });
        self
    }

    pub fn with_telegram(mut self, bot_id: &str, chat_id: &str) -> Self {
        self.config.notifications.telegram_bot_id = bot_id.to_string();
        self.config.notifications.telegram_chat_id = chat_id.to_string();
        self
    }

    pub fn cleanup(mut self, policy: CleanupPolicy) -> Self {
        self.config.cleanup.policy = policy;
        self
    }

    /// Prune the server's own family after every successful transfer
    pub fn prune_after_transfer(mut self, keep: usize) -> Self {
        self.config.retention.prune_after_transfer = true;
        self.config.retention.keep = keep;
        self
    }

    /// Build the configuration (temp dir is dropped)
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and keep the temp dir alive
    pub fn persist(self) -> (Config, TempDir) {
        (self.config, self.temp_dir)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
