//! Subprocess execution utilities.
//!
//! Stages never wait for a tool to finish before showing its output: every
//! line of stdout and stderr is forwarded to a [`LogSink`] as soon as it is
//! read, tagged with the work item's label.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::Level;

/// A command to run: program, arguments, working directory and env overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Create a new command for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        CommandSpec {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set several environment variables.
    pub fn envs<'a>(mut self, vars: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        for (key, value) in vars {
            self.env.insert(key.clone(), value.clone());
        }
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get the environment overlay.
    pub fn get_env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Get the working directory.
    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(&self.env);
        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }

    /// Display the command for log and error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The process ran and exited (signals map to -1).
    Exited(i32),
    /// The program does not exist or cannot be executed.
    NotFound(PathBuf),
}

impl ExecOutcome {
    /// Whether the process ran and exited with status 0.
    pub fn success(&self) -> bool {
        matches!(self, ExecOutcome::Exited(0))
    }
}

/// Runs external tools on behalf of the pipeline.
pub trait ProcessExecutor: Send + Sync {
    /// Run `cmd` to completion, streaming its output under `label`.
    ///
    /// A missing executable is reported as [`ExecOutcome::NotFound`], not as
    /// an error. `Err` is reserved for failures of the executor itself.
    fn execute(&self, cmd: &CommandSpec, label: &str) -> Result<ExecOutcome>;
}

/// Destination for labelled log lines.
pub trait LogSink: Send + Sync {
    /// Record one line.
    fn log(&self, label: &str, level: Level, message: &str);
}

/// Forwards lines to `tracing`, one event per line, prefixed with the label.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, label: &str, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!("{}: {}", label, message),
            Level::WARN => tracing::warn!("{}: {}", label, message),
            Level::INFO => tracing::info!("{}: {}", label, message),
            Level::DEBUG => tracing::debug!("{}: {}", label, message),
            Level::TRACE => tracing::trace!("{}: {}", label, message),
        }
    }
}

/// Executor that spawns real processes.
#[derive(Clone)]
pub struct SystemExecutor {
    sink: Arc<dyn LogSink>,
}

impl SystemExecutor {
    /// Create an executor that logs through `tracing`.
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingSink))
    }

    /// Create an executor with a custom sink.
    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        SystemExecutor { sink }
    }
}

impl Default for SystemExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessExecutor for SystemExecutor {
    fn execute(&self, cmd: &CommandSpec, label: &str) -> Result<ExecOutcome> {
        tracing::debug!(label, "running `{}`", cmd.display_command());

        let mut command = cmd.build_command();
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
                ) =>
            {
                return Ok(ExecOutcome::NotFound(cmd.program.clone()));
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to spawn `{}`", cmd.program.display())
                });
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let sink = self.sink.as_ref();

        std::thread::scope(|s| {
            if let Some(out) = stdout {
                s.spawn(move || stream_lines(out, label, Level::INFO, sink));
            }
            if let Some(err) = stderr {
                s.spawn(move || stream_lines(err, label, Level::INFO, sink));
            }
        });

        let status = child
            .wait()
            .with_context(|| format!("failed to wait for `{}`", cmd.program.display()))?;

        Ok(ExecOutcome::Exited(status.code().unwrap_or(-1)))
    }
}

/// Forward each line of `reader` to the sink as soon as it is complete.
fn stream_lines(reader: impl Read, label: &str, level: Level, sink: &dyn LogSink) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                sink.log(label, level, line.trim_end_matches(['\n', '\r']));
            }
            Err(e) => {
                tracing::warn!(label, "failed to read process output: {}", e);
                break;
            }
        }
    }
}

/// Find an executable by name.
///
/// Searches `search_path` when given, the host `PATH` otherwise. Names
/// containing a path separator are checked directly.
pub fn find_executable(name: impl AsRef<OsStr>, search_path: Option<&[PathBuf]>) -> Option<PathBuf> {
    match search_path {
        Some(dirs) => {
            let paths = std::env::join_paths(dirs).ok()?;
            let cwd = std::env::current_dir().ok()?;
            which::which_in(name, Some(paths), cwd).ok()
        }
        None => which::which(name).ok(),
    }
}

/// Whether a file exists and carries an execute permission bit.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Whether a file exists and carries an execute permission bit.
#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingSink;

    #[derive(Clone)]
    struct Capture(Arc<std::sync::Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_tracing_sink_prefixes_label_once() {
        let capture = Capture(Arc::default());
        let writer = {
            let capture = capture.clone();
            move || capture.clone()
        };
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(false)
            .with_level(false)
            .without_time()
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            TracingSink.log("official/deb", Level::INFO, "compiling lib/IR");
        });

        let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert_eq!(output, "official/deb: compiling lib/IR\n");
    }

    #[test]
    fn test_display_command() {
        let cmd = CommandSpec::new("make").args(["-j4", "ENABLE_OPTIMIZED=1", "check"]);
        assert_eq!(cmd.display_command(), "make -j4 ENABLE_OPTIMIZED=1 check");
    }

    #[test]
    fn test_env_overlay_is_sorted() {
        let cmd = CommandSpec::new("make").env("PATH", "/x").env("CC", "gcc");
        let keys: Vec<_> = cmd.get_env().keys().cloned().collect();
        assert_eq!(keys, vec!["CC", "PATH"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_streams_stdout_and_stderr() {
        let sink = Arc::new(RecordingSink::default());
        let exec = SystemExecutor::with_sink(sink.clone());

        let cmd = CommandSpec::new("sh").args(["-c", "echo one; echo two >&2; exit 3"]);
        let outcome = exec.execute(&cmd, "official/deb").unwrap();

        assert_eq!(outcome, ExecOutcome::Exited(3));
        let lines = sink.messages_for("official/deb");
        assert!(lines.contains(&"one".to_string()));
        assert!(lines.contains(&"two".to_string()));
    }

    #[test]
    fn test_missing_program_is_not_found() {
        let exec = SystemExecutor::new();
        let cmd = CommandSpec::new("/nonexistent/definitely-not-a-tool");
        let outcome = exec.execute(&cmd, "x").unwrap();
        assert!(matches!(outcome, ExecOutcome::NotFound(_)));
        assert!(!outcome.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_find_executable_in_search_path() {
        let found = find_executable("sh", Some(&[PathBuf::from("/bin"), PathBuf::from("/usr/bin")]));
        assert!(found.is_some());

        let tmp = tempfile::TempDir::new().unwrap();
        let missing = find_executable("sh", Some(&[tmp.path().to_path_buf()]));
        assert!(missing.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let script = tmp.path().join("configure");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();
        assert!(!is_executable(&script));

        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(is_executable(&script));
        assert!(!is_executable(&tmp.path().join("missing")));
    }
}
