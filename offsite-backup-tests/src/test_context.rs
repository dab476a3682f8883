//! Test context and harness for integration testing
//!
//! Owns the temporary directory of a test and, when built from a
//! [`ConfigBuilder`], the configuration rooted in it.

use crate::config_builder::ConfigBuilder;
use anyhow::Result;
use offsite_backup::config::{resolve_run_config, Config, RunConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test context that manages test resources and provides common utilities
pub struct TestContext {
    /// Temporary directory for test files
    temp_dir: TempDir,
    /// The test configuration
    config: Option<Config>,
}

impl TestContext {
    /// Create a new test context with a temporary directory
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
            config: None,
        }
    }

    /// Create a test context with a minimal configuration
    pub fn with_minimal_config() -> Self {
        Self::from_builder(ConfigBuilder::minimal())
    }

    /// Create a test context from a ConfigBuilder
    pub fn from_builder(builder: ConfigBuilder) -> Self {
        let (config, temp_dir) = builder.persist();

        Self {
            temp_dir,
            config: Some(config),
        }
    }

    /// Get the temporary directory path
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Get the configuration
    pub fn config(&self) -> Option<&Config> {
        self.config.as_ref()
    }

    /// Resolve the configuration into run options
    pub fn run_config(&self) -> RunConfig {
        let config = self.config.as_ref().expect("Context has no configuration");
        resolve_run_config(config, &[]).expect("Failed to resolve run config")
    }

    /// Lock directory of the configuration, or the temp dir
    pub fn lock_dir(&self) -> PathBuf {
        self.config
            .as_ref()
            .map(|c| c.lock.directory.clone())
            .unwrap_or_else(|| self.temp_dir().to_path_buf())
    }

    /// Write the configuration as `config.toml` and return its path
    pub fn write_config(&self) -> Result<PathBuf> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Context has no configuration"))?;
        let path = self.temp_dir().join("config.toml");
        fs::write(&path, toml::to_string(config)?)?;
        Ok(path)
    }

    /// Create a subdirectory in the temp dir
    pub fn create_subdir(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::create_dir_all(&path).expect("Failed to create subdir");
        path
    }

    /// Create a file in the temp dir with content
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Read a file from the temp dir
    pub fn read_file(&self, name: &str) -> Result<String> {
        let path = self.temp_dir.path().join(name);
        Ok(fs::read_to_string(path)?)
    }

    /// Check if a file exists in the temp dir
    pub fn file_exists(&self, name: &str) -> bool {
        self.temp_dir.path().join(name).exists()
    }

    /// Sorted names of the entries of a directory in the temp dir
    pub fn list_dir(&self, name: &str) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.temp_dir.path().join(name))
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
