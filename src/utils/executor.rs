//! Command execution abstraction for testability
//!
//! Every external program the backup pipeline touches (mysql, docker, tar,
//! ssh, scp, rsync, php) goes through [`CommandExecutor`], so stages can be
//! exercised in tests with [`mock::MockExecutor`].

use super::command::{CommandLine, Result};
use std::path::Path;
use std::process::Output;
use std::time::Duration;

/// Abstraction for command execution, enabling mocking in tests
pub trait CommandExecutor: Send + Sync {
    /// Run a command with optional timeout
    fn run_command(&self, command: &CommandLine, timeout: Option<Duration>) -> Result<Output>;

    /// Run a command and return stdout as string
    fn run_command_stdout(&self, command: &CommandLine, timeout: Option<Duration>)
        -> Result<String>;

    /// Run a command with stdout (and optionally stderr) redirected to a file
    fn run_command_to_file(
        &self,
        command: &CommandLine,
        path: &Path,
        merge_stderr: bool,
        timeout: Option<Duration>,
    ) -> Result<Output>;
}

/// Default implementation using real subprocess calls
#[derive(Debug, Clone, Default)]
pub struct RealExecutor;

impl RealExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for RealExecutor {
    fn run_command(&self, command: &CommandLine, timeout: Option<Duration>) -> Result<Output> {
        super::command::run_command(command, timeout)
    }

    fn run_command_stdout(
        &self,
        command: &CommandLine,
        timeout: Option<Duration>,
    ) -> Result<String> {
        super::command::run_command_stdout(command, timeout)
    }

    fn run_command_to_file(
        &self,
        command: &CommandLine,
        path: &Path,
        merge_stderr: bool,
        timeout: Option<Duration>,
    ) -> Result<Output> {
        super::command::run_command_to_file(command, path, merge_stderr, timeout)
    }
}

/// A mock executor for testing that records calls and returns configured responses
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use crate::utils::command::CommandError;
    use std::sync::{Arc, Mutex};

    /// Recorded command invocation
    #[derive(Clone, Debug)]
    pub struct CommandCall {
        pub program: String,
        pub args: Vec<String>,
        pub command: CommandLine,
        pub output_file: Option<String>,
    }

    impl CommandCall {
        /// True if any argument contains `fragment`
        pub fn mentions(&self, fragment: &str) -> bool {
            self.args.iter().any(|a| a.contains(fragment))
        }
    }

    /// Response configuration for mock
    #[derive(Clone, Debug)]
    pub enum MockResponse {
        Success { stdout: String, stderr: String },
        Failure { stderr: String, exit_code: i32 },
        Timeout,
    }

    impl MockResponse {
        pub fn stdout(stdout: &str) -> Self {
            MockResponse::Success {
                stdout: stdout.to_string(),
                stderr: String::new(),
            }
        }

        pub fn failure(exit_code: i32, stderr: &str) -> Self {
            MockResponse::Failure {
                stderr: stderr.to_string(),
                exit_code,
            }
        }
    }

    impl Default for MockResponse {
        fn default() -> Self {
            MockResponse::Success {
                stdout: String::new(),
                stderr: String::new(),
            }
        }
    }

    #[derive(Clone, Debug)]
    struct Rule {
        program: String,
        fragment: Option<String>,
        response: MockResponse,
    }

    /// Mock executor for testing
    #[derive(Clone, Default)]
    pub struct MockExecutor {
        /// Recorded command invocations
        pub calls: Arc<Mutex<Vec<CommandCall>>>,
        /// Pre-configured responses, most specific first when matching
        rules: Arc<Mutex<Vec<Rule>>>,
        /// Default response when no specific response is configured
        default_response: Arc<Mutex<MockResponse>>,
    }

    impl MockExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Configure a response for a specific program
        pub fn expect(self, program: &str, response: MockResponse) -> Self {
            self.rules.lock().unwrap().push(Rule {
                program: program.to_string(),
                fragment: None,
                response,
            });
            self
        }

        /// Configure a response for calls to `program` where some argument
        /// contains `fragment`. These rules win over [`Self::expect`].
        pub fn expect_when(self, program: &str, fragment: &str, response: MockResponse) -> Self {
            self.rules.lock().unwrap().push(Rule {
                program: program.to_string(),
                fragment: Some(fragment.to_string()),
                response,
            });
            self
        }

        /// Set the default response for unconfigured programs
        pub fn with_default_response(self, response: MockResponse) -> Self {
            *self.default_response.lock().unwrap() = response;
            self
        }

        /// Get all recorded calls
        pub fn get_calls(&self) -> Vec<CommandCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Calls made to `program`, in order
        pub fn calls_to(&self, program: &str) -> Vec<CommandCall> {
            self.get_calls()
                .into_iter()
                .filter(|c| c.program == program)
                .collect()
        }

        /// Check if a program was called
        pub fn was_called(&self, program: &str) -> bool {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .any(|c| c.program == program)
        }

        /// Get number of calls to a specific program
        pub fn call_count(&self, program: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.program == program)
                .count()
        }

        fn record_call(&self, command: &CommandLine, output_file: Option<&Path>) {
            self.calls.lock().unwrap().push(CommandCall {
                program: command.program().to_string(),
                args: command.get_args().to_vec(),
                command: command.clone(),
                output_file: output_file.map(|p| p.display().to_string()),
            });
        }

        fn get_response(&self, command: &CommandLine) -> MockResponse {
            let rules = self.rules.lock().unwrap();
            let program_rules = || rules.iter().filter(|r| r.program == command.program());

            let specific = program_rules().find(|r| match &r.fragment {
                Some(fragment) => command.get_args().iter().any(|a| a.contains(fragment.as_str())),
                None => false,
            });
            let general = || program_rules().find(|r| r.fragment.is_none());

            specific
                .or_else(general)
                .map(|r| r.response.clone())
                .unwrap_or_else(|| self.default_response.lock().unwrap().clone())
        }

        fn execute_response(
            &self,
            command: &CommandLine,
            response: MockResponse,
            timeout: Option<Duration>,
        ) -> Result<Output> {
            match response {
                MockResponse::Success { stdout, stderr } => Ok(Output {
                    status: std::process::ExitStatus::default(),
                    stdout: stdout.into_bytes(),
                    stderr: stderr.into_bytes(),
                }),
                MockResponse::Failure { stderr, exit_code } => Err(CommandError::Failed {
                    program: command.program().to_string(),
                    code: Some(exit_code),
                    stderr,
                }),
                MockResponse::Timeout => Err(CommandError::TimedOut {
                    program: command.program().to_string(),
                    timeout: timeout.unwrap_or_default(),
                }),
            }
        }
    }

    impl CommandExecutor for MockExecutor {
        fn run_command(&self, command: &CommandLine, timeout: Option<Duration>) -> Result<Output> {
            self.record_call(command, None);
            let response = self.get_response(command);
            self.execute_response(command, response, timeout)
        }

        fn run_command_stdout(
            &self,
            command: &CommandLine,
            timeout: Option<Duration>,
        ) -> Result<String> {
            let output = self.run_command(command, timeout)?;
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        }

        /// Writes the configured stdout into `path`. Like a real process the
        /// file is created before the command runs, so a failure leaves an
        /// empty file behind.
        fn run_command_to_file(
            &self,
            command: &CommandLine,
            path: &Path,
            _merge_stderr: bool,
            timeout: Option<Duration>,
        ) -> Result<Output> {
            self.record_call(command, Some(path));
            let response = self.get_response(command);

            let content = match &response {
                MockResponse::Success { stdout, .. } => stdout.clone(),
                _ => String::new(),
            };
            std::fs::write(path, content).map_err(|source| CommandError::OutputFile {
                path: path.to_path_buf(),
                source,
            })?;

            self.execute_response(command, response, timeout)
                .map(|output| Output {
                    stdout: Vec::new(),
                    ..output
                })
        }
    }
}
