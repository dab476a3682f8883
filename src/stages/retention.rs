//! Retention: keep only the newest timestamped backups of a family
//!
//! A family is a folder directly under the backup root. Its subdirectories
//! whose names end in a run stamp are the entries; anything else is left
//! alone and does not count towards the kept total.

use crate::utils::executor::CommandExecutor;
use crate::utils::ssh::RemoteSession;
use crate::utils::timestamp::RunStamp;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info};

/// Directory listing and removal, locally or on the backup host
pub trait BackupTree {
    /// Names of the immediate subdirectories of `dir`
    fn list_subdirs(&self, dir: &str) -> Result<Vec<String>>;

    /// Recursively delete `dir`
    fn remove_dir_all(&self, dir: &str) -> Result<()>;
}

/// The local filesystem (running on the backup host itself)
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTree;

impl BackupTree for LocalTree {
    fn list_subdirs(&self, dir: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir))? {
            let entry = entry.with_context(|| format!("Failed to read directory {}", dir))?;
            // follows symlinks, so a linked family or entry counts as a folder
            if entry.path().is_dir() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        Ok(names)
    }

    fn remove_dir_all(&self, dir: &str) -> Result<()> {
        fs::remove_dir_all(dir).with_context(|| format!("Failed to remove {}", dir))
    }
}

/// The backup host, reached over an open SSH session
pub struct RemoteTree<'s, 'a, E: CommandExecutor + ?Sized> {
    session: &'s RemoteSession<'a, E>,
}

impl<'s, 'a, E: CommandExecutor + ?Sized> RemoteTree<'s, 'a, E> {
    pub fn new(session: &'s RemoteSession<'a, E>) -> Self {
        Self { session }
    }
}

impl<E: CommandExecutor + ?Sized> BackupTree for RemoteTree<'_, '_, E> {
    fn list_subdirs(&self, dir: &str) -> Result<Vec<String>> {
        Ok(self.session.list_subdirs(dir)?)
    }

    fn remove_dir_all(&self, dir: &str) -> Result<()> {
        Ok(self.session.remove_dir_all(dir)?)
    }
}

/// A timestamped backup directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub name: String,
    pub path: String,
    pub stamp: RunStamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PruneFailure {
    pub path: String,
    pub cause: String,
}

/// Result of one pass over a family
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Kept entries, newest first
    pub survivors: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<PruneFailure>,
}

impl PruneReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

fn join(parent: &str, name: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), name)
}

/// Split `<root>/<family>` into its parts
pub fn split_family(dir: &str) -> Option<(&str, &str)> {
    let trimmed = dir.trim_end_matches('/');
    let (root, family) = trimmed.rsplit_once('/')?;
    if family.is_empty() {
        return None;
    }
    Some((if root.is_empty() { "/" } else { root }, family))
}

/// Timestamped entries of `family_dir`, newest first
pub fn scan_family<T: BackupTree + ?Sized>(tree: &T, family_dir: &str) -> Result<Vec<BackupEntry>> {
    let mut entries: Vec<BackupEntry> = tree
        .list_subdirs(family_dir)?
        .into_iter()
        .filter_map(|name| match RunStamp::from_name_suffix(&name) {
            Some(stamp) => Some(BackupEntry {
                path: join(family_dir, &name),
                name,
                stamp,
            }),
            None => {
                debug!("Ignoring non-backup directory: {}", name);
                None
            }
        })
        .collect();

    entries.sort_by(|a, b| b.stamp.cmp(&a.stamp).then_with(|| b.name.cmp(&a.name)));
    Ok(entries)
}

/// Delete all but the newest `keep` entries of `<root>/<family>`.
///
/// Listing failures are errors. A failed deletion is recorded and the pass
/// continues. Running it again on an already pruned family changes nothing.
pub fn prune<T: BackupTree + ?Sized>(
    tree: &T,
    root: &str,
    family: &str,
    keep: usize,
) -> Result<PruneReport> {
    let mut report = PruneReport::default();

    let children = tree.list_subdirs(root)?;
    if !children.iter().any(|c| c == family) {
        info!("No '{}' folder under {}, nothing to prune", family, root);
        return Ok(report);
    }

    let entries = scan_family(tree, &join(root, family))?;
    info!("Found {} backup(s) of '{}', keeping {}", entries.len(), family, keep.min(entries.len()));

    let mut entries = entries.into_iter();
    report.survivors = entries.by_ref().take(keep).map(|e| e.path).collect();

    for entry in entries {
        info!("Removing old backup: {}", entry.path);
        match tree.remove_dir_all(&entry.path) {
            Ok(()) => report.removed.push(entry.path),
            Err(e) => {
                error!("Failed to remove {}: {:#}", entry.path, e);
                report.failed.push(PruneFailure {
                    path: entry.path,
                    cause: format!("{:#}", e),
                });
            }
        }
    }

    Ok(report)
}

/// [`prune`] on the local filesystem
pub fn prune_local(root: &Path, family: &str, keep: usize) -> Result<PruneReport> {
    prune(&LocalTree, &root.display().to_string(), family, keep)
}
