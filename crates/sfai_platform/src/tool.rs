//! External command execution.
//!
//! Every provider talks to docker, helm, kubectl, aws, heroku and git
//! through the [`ToolRunner`] trait so tests can substitute a mock.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{PlatformError, PlatformResult};

/// A command line to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Written to the child's stdin, which is then closed
    pub stdin: Option<String>,
    /// Inherit the terminal instead of capturing output
    pub streamed: bool,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            stdin: None,
            streamed: false,
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

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn streamed(mut self) -> Self {
        self.streamed = true;
        self
    }

    /// The full command line, space separated.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command_line())
    }
}

/// Result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Trimmed standard output.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// Executes external commands.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run a command to completion. A non-zero exit is not an error.
    async fn run(&self, command: &ToolCommand) -> PlatformResult<ToolOutput>;

    /// Run a command, failing on a non-zero exit.
    async fn run_checked(&self, command: &ToolCommand) -> PlatformResult<ToolOutput> {
        let output = self.run(command).await?;
        if output.is_success() {
            return Ok(output);
        }
        let message = match output.stderr.trim() {
            "" => "command exited unsuccessfully".to_string(),
            stderr => stderr.to_string(),
        };
        Err(PlatformError::ToolFailed {
            command: command.command_line(),
            code: output.code,
            message,
        })
    }

    /// Whether a program answers its version check.
    async fn is_installed(&self, program: &str, version_args: &[&str]) -> bool {
        let command = ToolCommand::new(program).args(version_args.iter().copied());
        matches!(self.run(&command).await, Ok(output) if output.is_success())
    }
}

/// Runs commands on the host with `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemToolRunner;

impl SystemToolRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for SystemToolRunner {
    async fn run(&self, command: &ToolCommand) -> PlatformResult<ToolOutput> {
        debug!("Running: {}", command);

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        if command.streamed {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        cmd.stdin(match (&command.stdin, command.streamed) {
            (Some(_), _) => Stdio::piped(),
            (None, true) => Stdio::inherit(),
            (None, false) => Stdio::null(),
        });

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PlatformError::ToolNotInstalled {
                program: command.program.clone(),
                hint: format!("Install {} and make sure it is on PATH.", command.program),
            },
            _ => PlatformError::Io(e),
        })?;

        if let (Some(input), Some(mut stdin)) = (&command.stdin, child.stdin.take()) {
            stdin.write_all(input.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        let result = ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!("{} exited with {:?}", command.program, result.code);
        Ok(result)
    }
}
