//! Test fixtures and sample data

use anyhow::Result;
use offsite_backup::managers::notification::Notifier;
use offsite_backup::utils::timestamp::RunStamp;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A fixed run stamp
pub fn stamp(token: &str) -> RunStamp {
    RunStamp::parse(token).expect("Invalid stamp token")
}

/// The stamp most tests run at
pub fn sample_stamp() -> RunStamp {
    stamp("2024-01-12_08-30-00")
}

/// `SHOW DATABASES` output including the system schemas
pub fn mysql_listing(databases: &[&str]) -> String {
    let mut lines = vec!["information_schema", "performance_schema"];
    lines.extend_from_slice(databases);
    lines.join("\n") + "\n"
}

/// Three entries of one family, oldest first, as a server leaves them
pub fn family_entry_names(server: &str) -> Vec<String> {
    ["2024-01-10_00-00-00", "2024-01-11_00-00-00", "2024-01-12_00-00-00"]
        .iter()
        .map(|token| format!("backup_{}_{}", server, token))
        .collect()
}

/// Create `<root>/<family>/<name>` for each name, with a file inside
pub fn create_family_tree(root: &Path, family: &str, names: &[String]) -> PathBuf {
    let family_dir = root.join(family);
    for name in names {
        let dir = family_dir.join(name);
        fs::create_dir_all(&dir).expect("Failed to create backup dir");
        fs::write(dir.join("backup.tar.gz"), name).expect("Failed to write backup file");
    }
    fs::create_dir_all(&family_dir).expect("Failed to create family dir");
    family_dir
}

/// Notifier that remembers every message and answers with a fixed result
#[derive(Clone)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
    status: Option<u16>,
    fail: bool,
}

impl RecordingNotifier {
    /// Answers every message with HTTP 200
    pub fn new() -> Self {
        Self {
            messages: Arc::new(Mutex::new(Vec::new())),
            status: Some(200),
            fail: false,
        }
    }

    /// Answers with the given status
    pub fn with_status(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::new()
        }
    }

    /// Behaves like a notifier with no endpoint
    pub fn unconfigured() -> Self {
        Self {
            status: None,
            ..Self::new()
        }
    }

    /// Every delivery errors
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) -> Result<Option<u16>> {
        self.messages.lock().push(message.to_string());
        if self.fail {
            anyhow::bail!("connection refused");
        }
        Ok(self.status)
    }
}
