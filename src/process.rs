//! Process execution for the load-testing tool.
//!
//! The orchestrator never spawns processes itself. It hands a [`Command`]
//! to a [`ProcessRunner`], which keeps the pipeline testable with fake
//! runners and leaves timeout and cancellation policy to the runner.
//!
//! ```text
//! ┌──────────────┐   Command    ┌──────────────┐
//! │ Orchestrator │ ───────────► │ ProcessRunner│ ──► artillery run ...
//! │              │ ◄─────────── │              │
//! └──────────────┘ ProcessOutput└──────────────┘
//! ```
//!
//! # Built-in Runners
//!
//! | Runner | Module | Description |
//! |--------|--------|-------------|
//! | Local | [`local`] | Spawn the tool as a local child process |

pub mod local;

use std::time::Duration;

use async_trait::async_trait;

/// Errors reported by a process run.
///
/// None of these abort an execution: a load test that exits non-zero
/// usually still wrote a report worth reading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    /// The process could not be started.
    #[error("failed to start process: {0}")]
    Spawn(String),

    /// The process exited unsuccessfully.
    ///
    /// `code` is `None` when the process was killed by a signal.
    #[error("process exited with {}", describe_exit(.code))]
    ExitStatus { code: Option<i32> },

    /// The process ran longer than the configured timeout and was killed.
    #[error("process timed out after {0}s")]
    Timeout(u64),

    /// The run was cancelled by the caller.
    #[error("process was cancelled")]
    Cancelled,
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
    }
}

/// A command to execute.
///
/// # Example
///
/// ```
/// use artillery_runner::process::Command;
///
/// let cmd = Command::new("artillery")
///     .arg("run")
///     .arg("flow.yaml")
///     .args(["-o", "test-report.json"])
///     .working_dir("/data/tests")
///     .env("NODE_ENV", "ci")
///     .timeout(600);
///
/// assert_eq!(cmd.program, "artillery");
/// assert_eq!(cmd.args.len(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The program/executable to run.
    pub program: String,

    /// Arguments to pass to the program.
    pub args: Vec<String>,

    /// Working directory for command execution.
    pub working_dir: Option<String>,

    /// Environment variables to set for this command.
    pub env: Vec<(String, String)>,

    /// Maximum execution time in seconds.
    pub timeout_secs: Option<u64>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
            timeout_secs: None,
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

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Converts the command to a shell-escaped string for logging.
    ///
    /// ```
    /// use artillery_runner::process::Command;
    /// let cmd = Command::new("artillery").arg("run").arg("my flow.yaml");
    /// assert_eq!(cmd.to_shell_string(), "artillery run 'my flow.yaml'");
    /// ```
    pub fn to_shell_string(&self) -> String {
        shell_words::join(std::iter::once(&self.program).chain(&self.args))
    }
}

/// What a process run produced.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Interleaved stdout and stderr, one line per output line.
    pub output: String,

    /// Wall-clock time the process took.
    pub duration: Duration,

    /// Set on spawn failure, non-zero exit, timeout or cancellation.
    pub error: Option<ProcessError>,
}

impl ProcessOutput {
    /// Returns `true` if the process ran and exited with code 0.
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs commands on behalf of the orchestrator.
///
/// Implementations always return the output collected so far, even when
/// the run failed.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs the command to completion and returns its combined output.
    async fn run(&self, cmd: &Command) -> ProcessOutput;

    /// Runner name, for logging.
    fn name(&self) -> &'static str;
}
