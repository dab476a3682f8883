//! Configuration module for offsite-backup
//!
//! This module handles loading, validating, and resolving configuration from TOML files.
//!
//! The file is validated as a whole when loaded; required fields (server
//! name, remote credentials, the fields of the selected database mode) have
//! no defaults. [`resolve_run_config`] then turns it into the immutable
//! [`RunConfig`] a backup run is driven by.
//!
//! ## Example Usage
//!
//! ```no_run
//! use offsite_backup::config;
//!
//! let config = config::load_config("offsite-backup.toml")?;
//! let run = config::resolve_run_config(&config, &[])?;
//!
//! println!("Archiving {:?} for {}", run.directories, run.server_name);
//! # Ok::<(), offsite_backup::config::ConfigError>(())
//! ```

mod loader;
mod types;

pub use loader::{load_config, resolve_run_config, validate_config, ConfigError, Result};
pub use types::*;

/// Expand tilde (~) in path
pub fn expand_tilde(path: &std::path::Path) -> std::path::PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}
