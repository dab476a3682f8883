//! Utilities for running commands with proper error handling and timeouts

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Duration;
use tracing::debug;

/// A program invocation: program, arguments and extra environment.
///
/// Environment values never appear in the `Display` output, so credentials
/// passed through the environment stay out of the logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.envs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// True if any argument equals `needle`
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(self.envs.iter().map(|(k, v)| (k, v)));
        cmd.stdin(Stdio::null());
        cmd
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Why an external command did not succeed
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} failed with exit code {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("Failed to open output file {path:?}: {source}")]
    OutputFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CommandError {
    /// Exit code of a command that ran and failed
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { code, .. } => *code,
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Captured stderr of a failed command (empty otherwise)
    pub fn stderr(&self) -> &str {
        match self {
            Self::Failed { stderr, .. } => stderr,
            _ => "",
        }
    }
}

pub type Result<T> = std::result::Result<T, CommandError>;

/// Run a command with optional timeout; a non-zero exit is an error
pub fn run_command(command: &CommandLine, timeout: Option<Duration>) -> Result<Output> {
    let mut cmd = command.to_command();
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    debug!("Running command: {}", command);

    let output = execute(cmd, command.program(), timeout)?;
    check_status(command, output)
}

/// Run a command and return stdout as string
pub fn run_command_stdout(command: &CommandLine, timeout: Option<Duration>) -> Result<String> {
    let output = run_command(command, timeout)?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Run a command with stdout written to `path`.
///
/// With `merge_stderr` the file also receives stderr, which is how the
/// archive stage captures tar's verbose listing and its errors in one log.
pub fn run_command_to_file(
    command: &CommandLine,
    path: &Path,
    merge_stderr: bool,
    timeout: Option<Duration>,
) -> Result<Output> {
    let file = File::create(path).map_err(|source| CommandError::OutputFile {
        path: path.to_path_buf(),
        source,
    })?;

    let mut cmd = command.to_command();
    if merge_stderr {
        let err_file = file.try_clone().map_err(|source| CommandError::OutputFile {
            path: path.to_path_buf(),
            source,
        })?;
        cmd.stderr(Stdio::from(err_file));
    } else {
        cmd.stderr(Stdio::piped());
    }
    cmd.stdout(Stdio::from(file));

    debug!("Running command: {} > {:?}", command, path);

    let output = execute(cmd, command.program(), timeout)?;
    check_status(command, output)
}

/// Spawn and wait, enforcing the timeout through tokio when one is given.
///
/// The child is killed if the timeout expires.
fn execute(mut cmd: Command, program: &str, timeout: Option<Duration>) -> Result<Output> {
    let spawn_error = |source: io::Error| CommandError::Spawn {
        program: program.to_string(),
        source,
    };

    let Some(timeout_duration) = timeout else {
        return cmd.output().map_err(spawn_error);
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(spawn_error)?;

    runtime.block_on(async {
        let mut child = tokio::process::Command::from(cmd);
        child.kill_on_drop(true);

        match tokio::time::timeout(timeout_duration, child.output()).await {
            Ok(output) => output.map_err(spawn_error),
            Err(_) => Err(CommandError::TimedOut {
                program: program.to_string(),
                timeout: timeout_duration,
            }),
        }
    })
}

fn check_status(command: &CommandLine, output: Output) -> Result<Output> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!("Command failed: {} (exit code {:?})", command, output.status.code());
        if !stderr.is_empty() {
            debug!("Stderr: {}", stderr);
        }
        return Err(CommandError::Failed {
            program: command.program().to_string(),
            code: output.status.code(),
            stderr,
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.is_empty() {
        debug!("Command output: {}", stdout.trim_end());
    }

    Ok(output)
}
