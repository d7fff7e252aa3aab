//! Mock tool runner for testing.
//!
//! Records every command and answers from canned outputs, so provider
//! behavior can be tested without docker, helm or cloud CLIs installed.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{PlatformError, PlatformResult};
use crate::tool::{ToolCommand, ToolOutput, ToolRunner};

/// Mock tool runner for testing.
///
/// Outputs are matched against the command line by prefix. When several
/// prefixes match, the most recently added one wins. Unmatched commands
/// succeed with empty output.
#[derive(Clone, Default)]
pub struct MockToolRunner {
    /// Canned outputs keyed by command-line prefix.
    responses: Arc<RwLock<Vec<(String, ToolOutput)>>>,
    /// Programs that behave as if not installed.
    missing: Arc<RwLock<Vec<String>>>,
    /// Captured commands for verification.
    captured: Arc<RwLock<Vec<ToolCommand>>>,
    /// Simulated failure for every command.
    simulate_failure: Arc<RwLock<Option<String>>>,
}

impl MockToolRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with `output`.
    pub fn add_response(self, prefix: impl Into<String>, output: ToolOutput) -> Self {
        self.responses.write().push((prefix.into(), output));
        self
    }

    /// Make a program behave as if it were not installed.
    pub fn set_missing(self, program: impl Into<String>) -> Self {
        self.missing.write().push(program.into());
        self
    }

    /// Fail every command with a message.
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(message.into());
        self
    }

    /// Clear all captured commands.
    pub fn clear_calls(&self) {
        self.captured.write().clear();
    }

    /// Get all captured commands.
    pub fn get_calls(&self) -> Vec<ToolCommand> {
        self.captured.read().clone()
    }

    /// Captured commands as command lines.
    pub fn command_lines(&self) -> Vec<String> {
        self.captured.read().iter().map(ToolCommand::command_line).collect()
    }

    pub fn call_count(&self) -> usize {
        self.captured.read().len()
    }

    /// Check if a command starting with `prefix` was run.
    pub fn was_called(&self, prefix: &str) -> bool {
        self.captured
            .read()
            .iter()
            .any(|command| command.command_line().starts_with(prefix))
    }

    fn response_for(&self, command_line: &str) -> ToolOutput {
        self.responses
            .read()
            .iter()
            .rev()
            .find(|(prefix, _)| command_line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| ToolOutput::success(""))
    }
}

#[async_trait]
impl ToolRunner for MockToolRunner {
    async fn run(&self, command: &ToolCommand) -> PlatformResult<ToolOutput> {
        self.captured.write().push(command.clone());

        if self.missing.read().iter().any(|p| *p == command.program) {
            return Err(PlatformError::ToolNotInstalled {
                program: command.program.clone(),
                hint: "mock".to_string(),
            });
        }

        if let Some(message) = self.simulate_failure.read().clone() {
            return Ok(ToolOutput::failure(1, message));
        }

        Ok(self.response_for(&command.command_line()))
    }
}
