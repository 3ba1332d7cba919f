//! Local process runner.
//!
//! Spawns the load-testing tool as a child process of artillery-runner,
//! merging stdout and stderr into one combined output.
//!
//! # Characteristics
//!
//! | Feature | Support |
//! |---------|---------|
//! | Combined output | stdout and stderr merged line by line |
//! | Timeout | Per command via [`Command::timeout`] |
//! | Cancellation | Via [`CancellationToken`] |
//! | Cleanup | Child is killed when the run is abandoned |
//!
//! # Example
//!
//! ```no_run
//! use artillery_runner::process::local::LocalProcessRunner;
//! use artillery_runner::process::{Command, ProcessRunner};
//!
//! #[tokio::main]
//! async fn main() {
//!     let runner = LocalProcessRunner::new();
//!     let out = runner.run(&Command::new("artillery").arg("version")).await;
//!     println!("{}", out.output);
//! }
//! ```

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Command, ProcessError, ProcessOutput, ProcessRunner};

/// Runs commands as local child processes.
#[derive(Debug, Clone, Default)]
pub struct LocalProcessRunner {
    cancellation_token: Option<CancellationToken>,
}

impl LocalProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a cancellation token for early termination.
    ///
    /// When the token is cancelled, the child is killed and the run
    /// returns [`ProcessError::Cancelled`] with the output collected so far.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    async fn collect(&self, cmd: &Command, output: &mut String) -> Result<(), ProcessError> {
        let mut process = tokio::process::Command::new(&cmd.program);
        process.args(&cmd.args);
        if let Some(dir) = &cmd.working_dir {
            process.current_dir(dir);
        }
        for (key, value) in &cmd.env {
            process.env(key, value);
        }
        process.stdin(Stdio::null());
        process.stdout(Stdio::piped());
        process.stderr(Stdio::piped());
        process.kill_on_drop(true);

        let mut child = process
            .spawn()
            .map_err(|e| ProcessError::Spawn(format!("{}: {}", cmd.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProcessError::Spawn("failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProcessError::Spawn("failed to capture stderr".to_string()))?;

        let stdout_stream =
            tokio_stream::wrappers::LinesStream::new(BufReader::new(stdout).lines());
        let stderr_stream =
            tokio_stream::wrappers::LinesStream::new(BufReader::new(stderr).lines());

        // Merge stdout and stderr streams
        let mut lines = stream::select(stdout_stream, stderr_stream);

        loop {
            let next = match &self.cancellation_token {
                Some(token) => select! {
                    _ = token.cancelled() => {
                        debug!("Run of {} cancelled", cmd.program);
                        let _ = child.kill().await;
                        return Err(ProcessError::Cancelled);
                    }
                    line = lines.next() => line,
                },
                None => lines.next().await,
            };
            match next {
                Some(Ok(line)) => {
                    output.push_str(&line);
                    output.push('\n');
                }
                Some(Err(e)) => {
                    debug!("Failed to read output of {}: {}", cmd.program, e);
                }
                None => break,
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| ProcessError::Spawn(format!("failed to wait for {}: {}", cmd.program, e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(ProcessError::ExitStatus {
                code: status.code(),
            })
        }
    }
}

#[async_trait]
impl ProcessRunner for LocalProcessRunner {
    async fn run(&self, cmd: &Command) -> ProcessOutput {
        let start = Instant::now();
        let mut output = String::new();

        let result = match cmd.timeout_secs {
            Some(secs) => {
                match tokio::time::timeout(Duration::from_secs(secs), self.collect(cmd, &mut output))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProcessError::Timeout(secs)),
                }
            }
            None => self.collect(cmd, &mut output).await,
        };

        ProcessOutput {
            output,
            duration: start.elapsed(),
            error: result.err(),
        }
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_collects_both_streams() {
        let runner = LocalProcessRunner::new();
        let cmd = Command::new("sh").args(["-c", "echo out; echo err 1>&2"]);
        let out = runner.run(&cmd).await;

        assert!(out.success());
        assert!(out.output.contains("out\n"));
        assert!(out.output.contains("err\n"));
    }

    #[tokio::test]
    async fn test_run_non_zero_exit_keeps_output() {
        let runner = LocalProcessRunner::new();
        let cmd = Command::new("sh").args(["-c", "echo partial; exit 3"]);
        let out = runner.run(&cmd).await;

        assert_eq!(out.error, Some(ProcessError::ExitStatus { code: Some(3) }));
        assert_eq!(out.output, "partial\n");
    }

    #[tokio::test]
    async fn test_run_spawn_failure() {
        let runner = LocalProcessRunner::new();
        let out = runner
            .run(&Command::new("/definitely/not/a/real/binary"))
            .await;
        assert!(matches!(out.error, Some(ProcessError::Spawn(_))));
    }

    #[tokio::test]
    async fn test_run_working_dir_and_env() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = LocalProcessRunner::new();
        let cmd = Command::new("sh")
            .args(["-c", "pwd; echo $GREETING"])
            .working_dir(dir.path().to_string_lossy())
            .env("GREETING", "hello");
        let out = runner.run(&cmd).await;

        assert!(out.success());
        assert!(out.output.contains("hello"));
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let runner = LocalProcessRunner::new();
        let cmd = Command::new("sh").args(["-c", "sleep 5"]).timeout(1);
        let out = runner.run(&cmd).await;
        assert_eq!(out.error, Some(ProcessError::Timeout(1)));
    }

    #[tokio::test]
    async fn test_run_cancelled() {
        let token = CancellationToken::new();
        let runner = LocalProcessRunner::new().with_cancellation_token(token.clone());
        token.cancel();
        let out = runner
            .run(&Command::new("sh").args(["-c", "sleep 5"]))
            .await;
        assert_eq!(out.error, Some(ProcessError::Cancelled));
    }
}
