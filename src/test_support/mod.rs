//! Test utilities and mocks for buildmatrix unit tests.
//!
//! This module provides stand-ins for the external collaborators of the
//! pipeline: a recording process executor and a recording log sink.
//!
//! # Example
//!
//! ```rust,ignore
//! use buildmatrix::test_support::{MockExecutor, MockProcessOutput};
//!
//! #[test]
//! fn test_example() {
//!     let exec = MockExecutor::new();
//!     exec.expect_suffix(" check", MockProcessOutput::failure(1, "FAIL: x.ll"));
//!     exec.set_default(MockProcessOutput::success(""));
//!
//!     // Hand `&exec` to a PipelineRunner or Orchestrator...
//! }
//! ```

pub mod fixtures;

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use tracing::Level;

use crate::util::process::{CommandSpec, ExecOutcome, LogSink, ProcessExecutor};

// Re-export fixtures for convenience
pub use fixtures::*;

/// Mock process output for testing command execution.
#[derive(Debug, Clone)]
pub struct MockProcessOutput {
    /// Exit status code (0 = success, None = program not found).
    pub status: Option<i32>,
    /// Lines streamed to the sink.
    pub stdout: String,
    /// Executor-level error message, returned as `Err`.
    pub error: Option<String>,
}

impl MockProcessOutput {
    /// Create a successful output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        MockProcessOutput {
            status: Some(0),
            stdout: stdout.into(),
            error: None,
        }
    }

    /// Create a failure output with the given output and status code.
    pub fn failure(status: i32, output: impl Into<String>) -> Self {
        MockProcessOutput {
            status: Some(status),
            stdout: output.into(),
            error: None,
        }
    }

    /// The program does not exist.
    pub fn not_found() -> Self {
        MockProcessOutput {
            status: None,
            stdout: String::new(),
            error: None,
        }
    }

    /// The executor itself fails.
    pub fn error(message: impl Into<String>) -> Self {
        MockProcessOutput {
            status: Some(-1),
            stdout: String::new(),
            error: Some(message.into()),
        }
    }
}

impl Default for MockProcessOutput {
    fn default() -> Self {
        MockProcessOutput::success("")
    }
}

/// Pattern for matching commands in MockExecutor.
#[derive(Debug, Clone)]
pub enum CommandPattern {
    /// Exact match on full command string.
    Exact(String),
    /// Match if command starts with prefix.
    StartsWith(String),
    /// Match if command ends with suffix.
    EndsWith(String),
    /// Match if command contains substring.
    Contains(String),
    /// Match using a regex pattern.
    Regex(String),
    /// Match any command.
    Any,
}

impl CommandPattern {
    /// Check if this pattern matches the given command.
    pub fn matches(&self, cmd: &str) -> bool {
        match self {
            CommandPattern::Exact(s) => cmd == s,
            CommandPattern::StartsWith(s) => cmd.starts_with(s),
            CommandPattern::EndsWith(s) => cmd.ends_with(s),
            CommandPattern::Contains(s) => cmd.contains(s),
            CommandPattern::Regex(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(cmd))
                .unwrap_or(false),
            CommandPattern::Any => true,
        }
    }
}

/// Expectation for a command execution.
#[derive(Debug, Clone)]
pub struct CommandExpectation {
    /// Pattern to match against `"<label>: <command>"` or the bare command.
    pub pattern: CommandPattern,
    /// Only match calls made under this label.
    pub label: Option<String>,
    /// Output to return when matched.
    pub output: MockProcessOutput,
}

impl CommandExpectation {
    /// Create a new expectation.
    pub fn new(pattern: CommandPattern, output: MockProcessOutput) -> Self {
        CommandExpectation {
            pattern,
            label: None,
            output,
        }
    }

    /// Restrict this expectation to one label.
    pub fn for_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A recorded invocation.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub label: String,
    pub command: CommandSpec,
}

impl RecordedCall {
    /// The command line as a string.
    pub fn display(&self) -> String {
        self.command.display_command()
    }
}

#[derive(Debug, Default)]
struct MockState {
    expectations: Vec<CommandExpectation>,
    calls: Vec<RecordedCall>,
    default_output: Option<MockProcessOutput>,
}

/// Mock process executor for testing command execution.
///
/// Records every command and answers with the first matching expectation.
/// Commands are recorded with their program as given, so tests can match
/// on `make ...` without a real build tool.
#[derive(Default)]
pub struct MockExecutor {
    state: Mutex<MockState>,
    sink: Option<Arc<dyn LogSink>>,
}

impl MockExecutor {
    /// Create a new mock executor.
    pub fn new() -> Self {
        MockExecutor::default()
    }

    /// Stream mocked output to a sink.
    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        MockExecutor {
            state: Mutex::new(MockState::default()),
            sink: Some(sink),
        }
    }

    /// Add a custom expectation.
    pub fn expect_pattern(&self, expectation: CommandExpectation) -> &Self {
        self.state.lock().unwrap().expectations.push(expectation);
        self
    }

    /// Add an expectation for an exact command match.
    pub fn expect(&self, cmd: &str, output: MockProcessOutput) -> &Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::Exact(cmd.to_string()),
            output,
        ))
    }

    /// Add an expectation for a command starting with a prefix.
    pub fn expect_prefix(&self, prefix: &str, output: MockProcessOutput) -> &Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::StartsWith(prefix.to_string()),
            output,
        ))
    }

    /// Add an expectation for a command ending with a suffix.
    pub fn expect_suffix(&self, suffix: &str, output: MockProcessOutput) -> &Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::EndsWith(suffix.to_string()),
            output,
        ))
    }

    /// Add an expectation for a command containing a substring.
    pub fn expect_contains(&self, substring: &str, output: MockProcessOutput) -> &Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::Contains(substring.to_string()),
            output,
        ))
    }

    /// Set a default output for commands that don't match any expectation.
    pub fn set_default(&self, output: MockProcessOutput) -> &Self {
        self.state.lock().unwrap().default_output = Some(output);
        self
    }

    /// All command lines, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(RecordedCall::display)
            .collect()
    }

    /// Command lines issued under one label.
    pub fn calls_for(&self, label: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.label == label)
            .map(RecordedCall::display)
            .collect()
    }

    /// Every recorded call.
    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }
}

impl ProcessExecutor for MockExecutor {
    fn execute(&self, cmd: &CommandSpec, label: &str) -> Result<ExecOutcome> {
        let full_cmd = cmd.display_command();

        let output = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(RecordedCall {
                label: label.to_string(),
                command: cmd.clone(),
            });

            let matched = state
                .expectations
                .iter()
                .find(|exp| {
                    exp.label.as_deref().map_or(true, |l| l == label)
                        && exp.pattern.matches(&full_cmd)
                })
                .map(|exp| exp.output.clone());

            match matched.or_else(|| state.default_output.clone()) {
                Some(output) => output,
                None => bail!("unexpected command: {}", full_cmd),
            }
        };

        if let Some(message) = output.error {
            bail!("{}", message);
        }

        if let Some(sink) = &self.sink {
            for line in output.stdout.lines() {
                sink.log(label, Level::INFO, line);
            }
        }

        Ok(match output.status {
            Some(code) => ExecOutcome::Exited(code),
            None => ExecOutcome::NotFound(cmd.get_program().to_path_buf()),
        })
    }
}

/// Log sink that keeps every line in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<(String, Level, String)>>,
}

impl RecordingSink {
    /// Messages logged under one label, in order.
    pub fn messages_for(&self, label: &str) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _, _)| l == label)
            .map(|(_, _, m)| m.clone())
            .collect()
    }

    /// Number of lines recorded.
    pub fn len(&self) -> usize {
        self.lines.lock().unwrap().len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for RecordingSink {
    fn log(&self, label: &str, level: Level, message: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((label.to_string(), level, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_pattern_matching() {
        assert!(CommandPattern::Exact("make -j2".into()).matches("make -j2"));
        assert!(CommandPattern::StartsWith("make".into()).matches("make -j2 check"));
        assert!(CommandPattern::EndsWith("check".into()).matches("make -j2 check"));
        assert!(CommandPattern::Contains("-j2".into()).matches("make -j2 check"));
        assert!(CommandPattern::Regex(r"-j\d+".into()).matches("make -j16"));
        assert!(CommandPattern::Any.matches("anything"));
        assert!(!CommandPattern::EndsWith("install".into()).matches("make check"));
    }

    #[test]
    fn test_mock_executor_first_match_wins() {
        let exec = MockExecutor::new();
        exec.expect_suffix("check", MockProcessOutput::failure(1, ""));
        exec.set_default(MockProcessOutput::success(""));

        let check = CommandSpec::new("make").arg("check");
        let install = CommandSpec::new("make").arg("install");
        assert_eq!(exec.execute(&check, "a").unwrap(), ExecOutcome::Exited(1));
        assert_eq!(exec.execute(&install, "b").unwrap(), ExecOutcome::Exited(0));

        assert_eq!(exec.calls(), vec!["make check", "make install"]);
        assert_eq!(exec.calls_for("b"), vec!["make install"]);
    }

    #[test]
    fn test_mock_executor_label_scoped_expectation() {
        let exec = MockExecutor::new();
        exec.expect_pattern(
            CommandExpectation::new(CommandPattern::Any, MockProcessOutput::failure(2, ""))
                .for_label("x/rel"),
        );
        exec.set_default(MockProcessOutput::success(""));

        let cmd = CommandSpec::new("make");
        assert_eq!(exec.execute(&cmd, "x/rel").unwrap(), ExecOutcome::Exited(2));
        assert_eq!(exec.execute(&cmd, "x/deb").unwrap(), ExecOutcome::Exited(0));
    }

    #[test]
    fn test_mock_executor_unexpected_command() {
        let exec = MockExecutor::new();
        assert!(exec.execute(&CommandSpec::new("make"), "x").is_err());
    }

    #[test]
    fn test_mock_executor_streams_to_sink() {
        let sink = Arc::new(RecordingSink::default());
        let exec = MockExecutor::with_sink(sink.clone());
        exec.set_default(MockProcessOutput::success("line one\nline two"));

        exec.execute(&CommandSpec::new("make"), "x/deb").unwrap();
        assert_eq!(sink.messages_for("x/deb"), vec!["line one", "line two"]);
    }
}
