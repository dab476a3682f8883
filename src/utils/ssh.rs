//! Scoped SSH control session to the backup host
//!
//! One password-authenticated master connection is opened through
//! `sshpass -e`; every later `ssh`, `scp` and `rsync` call multiplexes over its
//! control socket. The master is shut down with `ssh -O exit` when the
//! session is dropped.

use super::command::{CommandError, CommandLine, Result};
use super::executor::CommandExecutor;
use crate::config::RemoteConfig;
use std::io;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// sshpass exit status for a rejected password
const SSHPASS_AUTH_FAILED: i32 = 5;

/// Where and as whom to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl RemoteTarget {
    /// `user@host`
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

impl From<&RemoteConfig> for RemoteTarget {
    fn from(remote: &RemoteConfig) -> Self {
        Self {
            host: remote.host.clone(),
            port: remote.port,
            user: remote.username.clone(),
            password: remote.password.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("SSH authentication to {target} failed: {detail}")]
    AuthenticationFailed { target: String, detail: String },

    #[error("Failed to open SSH session to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: CommandError,
    },

    #[error("Failed to create SSH control directory: {0}")]
    ControlDir(#[source] io::Error),
}

impl SessionError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }
}

/// Quote a string for a POSIX shell on the remote side
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// An open control connection. Closed on drop.
pub struct RemoteSession<'a, E: CommandExecutor + ?Sized> {
    executor: &'a E,
    target: RemoteTarget,
    // Removed after the master has been told to exit
    _control_dir: TempDir,
    control_path: String,
    timeout: Duration,
}

impl<'a, E: CommandExecutor + ?Sized> RemoteSession<'a, E> {
    /// Authenticate and start the control master.
    ///
    /// `timeout` applies to this call and to every command later run over
    /// the session.
    pub fn open(
        executor: &'a E,
        target: RemoteTarget,
        timeout: Duration,
    ) -> std::result::Result<Self, SessionError> {
        let control_dir = tempfile::Builder::new()
            .prefix("offsite-ssh-")
            .tempdir()
            .map_err(SessionError::ControlDir)?;
        let control_path = control_dir.path().join("ctl").display().to_string();

        let cmd = CommandLine::new("sshpass")
            .args(["-e", "ssh"])
            .args(["-o", "StrictHostKeyChecking=accept-new"])
            .args(["-o", "ControlMaster=yes"])
            .args(["-o", &format!("ControlPath={}", control_path)])
            .args(["-o", "ControlPersist=yes"])
            .args(["-p", &target.port.to_string()])
            .args(["-f", "-N"])
            .arg(target.destination())
            .env("SSHPASS", target.password.clone());

        info!("Opening SSH session to {} (port {})", target.destination(), target.port);

        match executor.run_command(&cmd, Some(timeout)) {
            Ok(_) => {
                debug!("SSH control master ready at {}", control_path);
                Ok(Self {
                    executor,
                    target,
                    _control_dir: control_dir,
                    control_path,
                    timeout,
                })
            }
            Err(e)
                if e.exit_code() == Some(SSHPASS_AUTH_FAILED)
                    || e.stderr().contains("Permission denied") =>
            {
                Err(SessionError::AuthenticationFailed {
                    target: target.destination(),
                    detail: if e.stderr().is_empty() {
                        "password rejected".to_string()
                    } else {
                        e.stderr().to_string()
                    },
                })
            }
            Err(source) => Err(SessionError::Connect {
                target: target.destination(),
                source,
            }),
        }
    }

    pub fn target(&self) -> &RemoteTarget {
        &self.target
    }

    pub fn executor(&self) -> &'a E {
        self.executor
    }

    /// Options that route an ssh invocation through the control socket
    fn control_options(&self) -> Vec<String> {
        vec![
            "-o".to_string(),
            format!("ControlPath={}", self.control_path),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ]
    }

    /// Value for `rsync -e`, so the mirror reuses this connection
    pub fn rsync_transport(&self) -> String {
        format!(
            "ssh -o ControlPath={} -o BatchMode=yes -p {}",
            self.control_path, self.target.port
        )
    }

    /// Run a shell command line on the remote host and return its stdout
    pub fn run_remote(&self, command: &str) -> Result<String> {
        let cmd = CommandLine::new("ssh")
            .args(self.control_options())
            .args(["-p", &self.target.port.to_string()])
            .arg(self.target.destination())
            .arg(command);
        self.executor.run_command_stdout(&cmd, Some(self.timeout))
    }

    /// Make sure `dir` exists. Returns true if it had to be created.
    ///
    /// Only a "not found" answer from `test -d` (exit 1) leads to `mkdir -p`;
    /// any other failure is returned.
    pub fn ensure_dir(&self, dir: &str) -> Result<bool> {
        let quoted = shell_quote(dir);
        match self.run_remote(&format!("test -d {}", quoted)) {
            Ok(_) => {
                debug!("Remote directory exists: {}", dir);
                Ok(false)
            }
            Err(e) if e.exit_code() == Some(1) => {
                info!("Creating remote directory: {}", dir);
                self.run_remote(&format!("mkdir -p {}", quoted))?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Copy a local file into `remote_dir`, keeping its base name
    pub fn upload(&self, local: &Path, remote_dir: &str, timeout: Duration) -> Result<()> {
        let cmd = CommandLine::new("scp")
            .args(self.control_options())
            .args(["-P", &self.target.port.to_string()])
            .arg(local.display().to_string())
            .arg(format!(
                "{}:{}/",
                self.target.destination(),
                remote_dir.trim_end_matches('/')
            ));

        info!("Uploading {:?} to {}", local, remote_dir);
        self.executor.run_command(&cmd, Some(timeout))?;
        Ok(())
    }

    /// Names of the immediate subdirectories of `dir`
    pub fn list_subdirs(&self, dir: &str) -> Result<Vec<String>> {
        let stdout = self.run_remote(&format!(
            "find -L {} -mindepth 1 -maxdepth 1 -type d -printf '%f\\n'",
            shell_quote(dir)
        ))?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// Recursively delete `dir` on the remote host
    pub fn remove_dir_all(&self, dir: &str) -> Result<()> {
        self.run_remote(&format!("rm -rf -- {}", shell_quote(dir)))?;
        Ok(())
    }
}

impl<E: CommandExecutor + ?Sized> Drop for RemoteSession<'_, E> {
    fn drop(&mut self) {
        let cmd = CommandLine::new("ssh")
            .args(["-o", &format!("ControlPath={}", self.control_path)])
            .args(["-O", "exit"])
            .arg(self.target.destination());

        match self.executor.run_command(&cmd, Some(Duration::from_secs(30))) {
            Ok(_) => debug!("Closed SSH session to {}", self.target.destination()),
            Err(e) => warn!("Failed to close SSH session cleanly: {}", e),
        }
    }
}
