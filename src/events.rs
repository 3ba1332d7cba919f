//! Milestone events emitted during an execution.
//!
//! Events are fire-and-forget notifications for observability. Nothing in
//! the pipeline depends on them, and sinks must not fail the execution.

use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::result::Status;

/// A milestone in the life of one execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent<'a> {
    Started { execution_id: &'a str },
    ContentFetched { path: &'a Path },
    VariablesPrepared { count: usize, file: Option<&'a Path> },
    /// `command_line` is already redacted.
    ToolStarted { command_line: &'a str, working_dir: &'a Path },
    ToolFinished { duration: Duration, succeeded: bool },
    ReportParsed { path: &'a Path },
    ArtifactsScraped { count: usize },
    Completed { execution_id: &'a str, status: Status },
}

/// Receives execution events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ExecutionEvent<'_>);
}

/// A sink that does nothing.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &ExecutionEvent<'_>) {}
}

/// A sink that logs every event through `tracing`.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &ExecutionEvent<'_>) {
        match event {
            ExecutionEvent::Started { execution_id } => {
                info!("Starting execution {}", execution_id)
            }
            ExecutionEvent::ContentFetched { path } => {
                info!("Created content path {}", path.display())
            }
            ExecutionEvent::VariablesPrepared { count, file } => match file {
                Some(file) => info!("Created dotenv file {} ({} variables)", file.display(), count),
                None => info!("Prepared {} variables", count),
            },
            ExecutionEvent::ToolStarted {
                command_line,
                working_dir,
            } => info!("Running {} in {}", command_line, working_dir.display()),
            ExecutionEvent::ToolFinished {
                duration,
                succeeded,
            } => {
                if *succeeded {
                    info!("Load test finished in {:?}", duration)
                } else {
                    info!("Load test exited with an error after {:?}", duration)
                }
            }
            ExecutionEvent::ReportParsed { path } => info!("Parsed report {}", path.display()),
            ExecutionEvent::ArtifactsScraped { count } => info!("Archived {} artifacts", count),
            ExecutionEvent::Completed {
                execution_id,
                status,
            } => info!("Execution {} completed: {}", execution_id, status),
        }
    }
}
