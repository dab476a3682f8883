//! File-based locking to prevent overlapping runs and prune passes

use anyhow::{Context, Result};
use fd_lock::RwLock;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Exclusive lock keyed by a name (a server for backup runs, a family for
/// prune passes)
#[derive(Debug, Clone)]
pub struct RunLock {
    name: String,
    lock_path: PathBuf,
}

impl RunLock {
    pub fn new(directory: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            lock_path: directory.join(format!("offsite-backup-{}.lock", name)),
        }
    }

    /// Run `f` while holding the lock.
    ///
    /// Fails without waiting if another process holds it. The lock is released
    /// when `f` returns or unwinds.
    pub fn hold<T>(&self, f: impl FnOnce() -> T) -> Result<T> {
        debug!("Attempting to acquire lock: {:?}", self.lock_path);

        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent).context("Failed to create lock directory")?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .with_context(|| format!("Failed to open lock file: {:?}", self.lock_path))?;

        let mut lock = RwLock::new(file);
        let _guard = lock.try_write().with_context(|| {
            format!("'{}' is already in progress (lock held: {:?})", self.name, self.lock_path)
        })?;

        info!("Acquired lock for '{}'", self.name);
        let result = f();
        info!("Released lock for '{}'", self.name);

        Ok(result)
    }

    /// Get the lock file path (for cleanup or inspection)
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}
