use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::clienv;
use crate::error::{HarborError, Result};

/// sudo diagnostics that mean elevation itself failed, not the wrapped command.
const SUDO_AUTH_FAILURES: &[&str] = &[
    "a password is required",
    "incorrect password attempt",
    "is not in the sudoers file",
    "no tty present",
    "a terminal is required",
    "Sorry, try again",
];

/// A single external process call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Run with elevated privileges (sudo).
    pub privileged: bool,
    /// Piped to the child's stdin; `None` inherits the terminal so sudo can prompt.
    pub stdin: Option<String>,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            privileged: false,
            stdin: None,
        }
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// `program arg1 arg2`, without any elevation prefix.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn display_line(&self) -> String {
        if self.privileged {
            format!("sudo {}", self.command_line())
        } else {
            self.command_line()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(exit_code),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    fn diagnostics(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.clone()
        } else {
            self.stderr.clone()
        }
    }
}

/// Runs external commands, optionally elevated.
///
/// Every call harbor makes to brew, launchctl, pfctl or sudo goes through
/// this trait so tests can substitute a recorder instead of shelling out.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Runs to completion and captures output. A non-zero exit is not an
    /// error at this level; only failing to spawn is.
    async fn execute(&self, invocation: &Invocation) -> Result<CommandOutput>;

    /// Runs and fails with `ExternalCommandFailed` (or
    /// `PrivilegeEscalationFailed`) on a non-zero exit.
    async fn run_checked(&self, invocation: Invocation) -> Result<CommandOutput> {
        let output = self.execute(&invocation).await?;
        if output.success() {
            return Ok(output);
        }

        let diagnostics = output.diagnostics();
        if invocation.privileged
            && SUDO_AUTH_FAILURES
                .iter()
                .any(|pattern| diagnostics.contains(pattern))
        {
            return Err(HarborError::PrivilegeEscalationFailed {
                command: invocation.display_line(),
                diagnostics,
            });
        }

        Err(HarborError::ExternalCommandFailed {
            command: invocation.display_line(),
            exit_code: output.exit_code,
            diagnostics,
        })
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        self.run_checked(Invocation::new(program, args.iter().copied()))
            .await
    }

    async fn sudo_run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        self.run_checked(Invocation::new(program, args.iter().copied()).privileged(true))
            .await
    }

    /// Trimmed stdout of a successful run.
    async fn capture(&self, program: &str, args: &[&str], privileged: bool) -> Result<String> {
        let output = self
            .run_checked(Invocation::new(program, args.iter().copied()).privileged(privileged))
            .await?;
        Ok(output.stdout.trim().to_string())
    }
}

/// Spawns real processes, prefixing privileged calls with `sudo` unless
/// harbor already runs as root.
pub struct SystemExecutor {
    elevate_with_sudo: bool,
}

impl SystemExecutor {
    pub fn new() -> Self {
        Self {
            elevate_with_sudo: !clienv::is_root(),
        }
    }
}

impl Default for SystemExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn execute(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let mut cmd = if invocation.privileged && self.elevate_with_sudo {
            info!(
                "Running privileged command: {} {:?}",
                invocation.program, invocation.args
            );
            let mut cmd = Command::new("sudo");
            cmd.arg(&invocation.program);
            cmd
        } else {
            debug!(
                "Running command: {} {:?}",
                invocation.program, invocation.args
            );
            Command::new(&invocation.program)
        };
        cmd.args(&invocation.args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = match &invocation.stdin {
            Some(input) => {
                cmd.stdin(Stdio::piped());
                let mut child = cmd.spawn()?;
                if let Some(mut stdin) = child.stdin.take() {
                    stdin.write_all(input.as_bytes()).await?;
                }
                child.wait_with_output().await?
            }
            None => {
                cmd.stdin(Stdio::inherit());
                cmd.output().await?
            }
        };

        debug!(
            "Command finished with exit code: {:?}",
            output.status.code()
        );

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingExecutor;

    #[test]
    fn command_line_joins_args() {
        let inv = Invocation::new("brew", ["services", "restart", "caddy"]).privileged(true);
        assert_eq!(inv.command_line(), "brew services restart caddy");
        assert_eq!(inv.display_line(), "sudo brew services restart caddy");
    }

    #[tokio::test]
    async fn checked_run_surfaces_diagnostics() {
        let executor = RecordingExecutor::new();
        executor.fail("brew services restart caddy", 1, "Error: Failure while executing");

        let err = executor
            .run("brew", &["services", "restart", "caddy"])
            .await
            .unwrap_err();
        match err {
            HarborError::ExternalCommandFailed {
                command,
                exit_code,
                diagnostics,
            } => {
                assert_eq!(command, "brew services restart caddy");
                assert_eq!(exit_code, Some(1));
                assert!(diagnostics.contains("Failure while executing"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn sudo_auth_failure_is_escalation_error() {
        let executor = RecordingExecutor::new();
        executor.fail("rm -f /etc/resolver/test", 1, "sudo: a password is required\n");

        let err = executor
            .sudo_run("rm", &["-f", "/etc/resolver/test"])
            .await
            .unwrap_err();
        assert!(matches!(err, HarborError::PrivilegeEscalationFailed { .. }));
    }

    #[tokio::test]
    async fn capture_trims_stdout() {
        let executor = RecordingExecutor::new();
        executor.respond("brew --prefix", "/opt/homebrew\n");
        let prefix = executor.capture("brew", &["--prefix"], false).await.unwrap();
        assert_eq!(prefix, "/opt/homebrew");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn system_executor_pipes_stdin() {
        let executor = SystemExecutor { elevate_with_sudo: false };
        let output = executor
            .execute(&Invocation::new("cat", Vec::<String>::new()).stdin("hello"))
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "hello");
    }
}
