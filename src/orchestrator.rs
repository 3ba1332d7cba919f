//! Execution pipeline.
//!
//! The [`Orchestrator`] drives one execution from request to normalized
//! result. It owns no process or filesystem policy of its own: every side
//! effect goes through a collaborator trait.
//!
//! # Architecture
//!
//! ```text
//!  ExecutionRequest
//!        │ validate, inject git credentials (private copy)
//!        ▼
//!  ContentFetcher::fetch() ──► content path
//!        │
//!        ▼
//!  InvocationBuilder::build() ──► ToolInvocation (+ dotenv file), old report removed
//!        │
//!        ▼
//!  ProcessRunner::run() ──► ProcessOutput ──► SecretManager::obfuscate()
//!        │
//!        ▼
//!  read_report() ──► RawReport ──► map_report() ──► NormalizedResult
//!        │
//!        ▼
//!  ArtifactScraper::scrape()   (when enabled)
//! ```
//!
//! # Failure Precedence
//!
//! | Failure | Result status | Returned error |
//! |---------|---------------|----------------|
//! | validation, fetch, invocation | error | that error, nothing runs after it |
//! | process only | from the report | [`ExecutionError::Process`] (non-fatal) |
//! | report unreadable | error | [`ExecutionError::ReportParse`], with the process error as context |
//! | scrape | error, steps kept | [`ExecutionError::Scrape`] |
//!
//! A [`NormalizedResult`] is returned for every execution, whatever failed.
//!
//! # Example
//!
//! ```no_run
//! use artillery_runner::config::Config;
//! use artillery_runner::content::LocalFetcher;
//! use artillery_runner::execution::{ContentDescriptor, ExecutionRequest};
//! use artillery_runner::orchestrator::Orchestrator;
//! use artillery_runner::process::local::LocalProcessRunner;
//!
//! # async fn example() {
//! let config = Config::default();
//! let orchestrator = Orchestrator::new(
//!     &config,
//!     LocalFetcher::new(&config.runner.data_dir),
//!     LocalProcessRunner::new(),
//! );
//!
//! let request = ExecutionRequest::new("exec-1", ContentDescriptor::file("/data/flow.yaml"));
//! let outcome = orchestrator.execute(&request).await;
//! std::process::exit(outcome.result.status.exit_code());
//! # }
//! ```

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::Config;
use crate::content::{ContentFetcher, FetchError};
use crate::events::{EventSink, ExecutionEvent, NullSink};
use crate::execution::{ExecutionRequest, RuntimeVariable};
use crate::invocation::{InvocationBuilder, InvocationError};
use crate::mapper::map_report;
use crate::process::{ProcessError, ProcessRunner};
use crate::report::{self, RawReport, ReportParseError};
use crate::result::{NormalizedResult, Status};
use crate::scraper::{ArtifactScraper, ScrapeError};
use crate::secret::{EnvManager, SecretManager};

/// Why an execution did not complete cleanly.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The request is malformed. Nothing was fetched or run.
    #[error("invalid execution request: {0}")]
    Validation(String),

    #[error("failed to fetch content: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to build invocation: {0}")]
    Invocation(#[from] InvocationError),

    /// The tool failed but its report was still usable.
    #[error("load test tool reported an error: {0}")]
    Process(ProcessError),

    /// The report could not be read; `process` is the tool's own error, if
    /// it reported one.
    #[error(
        "failed to get test execution results: {}{}",
        .source,
        process_context(.process)
    )]
    ReportParse {
        #[source]
        source: ReportParseError,
        process: Option<ProcessError>,
    },

    #[error("scrape artifacts error: {0}")]
    Scrape(#[source] ScrapeError),
}

fn process_context(process: &Option<ProcessError>) -> String {
    match process {
        Some(err) => format!(" (load test tool: {})", err),
        None => String::new(),
    }
}

impl ExecutionError {
    /// Returns `false` only for errors that left the result intact.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ExecutionError::Process(_))
    }
}

/// The result of one execution together with its pipeline error.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub result: NormalizedResult,
    pub error: Option<ExecutionError>,
}

impl ExecutionOutcome {
    fn failed(error: ExecutionError, duration: Duration) -> Self {
        Self {
            result: NormalizedResult::from_error(error.to_string()).with_duration(duration),
            error: Some(error),
        }
    }

    /// Returns `true` if the execution passed without any pipeline error.
    pub fn success(&self) -> bool {
        self.result.status.is_success() && self.error.is_none()
    }
}

/// Runs executions against a set of collaborators.
///
/// Holds no per-execution state, so one instance can serve concurrent
/// executions.
pub struct Orchestrator {
    config: Config,
    fetcher: Box<dyn ContentFetcher>,
    runner: Box<dyn ProcessRunner>,
    secrets: Box<dyn SecretManager>,
    scraper: Option<Box<dyn ArtifactScraper>>,
    events: Box<dyn EventSink>,
}

impl Orchestrator {
    /// Creates an orchestrator with the default [`EnvManager`], no scraper
    /// and no event sink.
    pub fn new(
        config: &Config,
        fetcher: impl ContentFetcher + 'static,
        runner: impl ProcessRunner + 'static,
    ) -> Self {
        Self {
            config: config.clone(),
            fetcher: Box::new(fetcher),
            runner: Box::new(runner),
            secrets: Box::new(EnvManager::new()),
            scraper: None,
            events: Box::new(NullSink),
        }
    }

    /// Uploads the report after each run.
    ///
    /// The scraper is only called while `[scraper] enabled` is set, so a
    /// configured scraper can be switched off without rewiring.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use artillery_runner::config::Config;
    /// use artillery_runner::content::LocalFetcher;
    /// use artillery_runner::orchestrator::Orchestrator;
    /// use artillery_runner::process::local::LocalProcessRunner;
    /// use artillery_runner::scraper::DirectoryScraper;
    ///
    /// let config = Config::default();
    /// let orchestrator = Orchestrator::new(
    ///     &config,
    ///     LocalFetcher::new(&config.runner.data_dir),
    ///     LocalProcessRunner::new(),
    /// )
    /// .with_scraper(DirectoryScraper::new("/data/artifacts"));
    /// ```
    pub fn with_scraper(mut self, scraper: impl ArtifactScraper + 'static) -> Self {
        self.scraper = Some(Box::new(scraper));
        self
    }

    /// Replaces the default [`NullSink`].
    pub fn with_events(mut self, events: impl EventSink + 'static) -> Self {
        self.events = Box::new(events);
        self
    }

    /// Runs one execution to completion.
    ///
    /// Never fails outright: the outcome always carries a result, and any
    /// pipeline error is returned next to it.
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionOutcome {
        let start = Instant::now();
        let mut request = request.clone().normalized();
        self.events.emit(&ExecutionEvent::Started {
            execution_id: &request.id,
        });

        let outcome = self.run_pipeline(&mut request, start).await;

        if let Some(err) = &outcome.error {
            if err.is_fatal() {
                warn!("Execution {} failed: {}", request.id, err);
            } else {
                debug!("Execution {}: {}", request.id, err);
            }
        }
        self.events.emit(&ExecutionEvent::Completed {
            execution_id: &request.id,
            status: outcome.result.status,
        });
        outcome
    }

    async fn run_pipeline(&self, request: &mut ExecutionRequest, start: Instant) -> ExecutionOutcome {
        if let Err(reason) = request.validate() {
            return ExecutionOutcome::failed(ExecutionError::Validation(reason), start.elapsed());
        }

        self.inject_credentials(request);

        let Some(content) = &request.content else {
            return ExecutionOutcome::failed(
                ExecutionError::Validation("missing content".to_string()),
                start.elapsed(),
            );
        };
        let content_path = match self.fetcher.fetch(content).await {
            Ok(path) => path,
            Err(e) => return ExecutionOutcome::failed(e.into(), start.elapsed()),
        };
        self.events.emit(&ExecutionEvent::ContentFetched {
            path: &content_path,
        });

        let variables = self.secrets.resolve_variables(request);
        let redactions = self.redactions(request, &variables);

        let invocation = match InvocationBuilder::new(&self.config.runner).build(
            request,
            &content_path,
            &variables,
        ) {
            Ok(invocation) => invocation,
            Err(e) => return ExecutionOutcome::failed(e.into(), start.elapsed()),
        };
        self.events.emit(&ExecutionEvent::VariablesPrepared {
            count: variables.len(),
            file: invocation.variable_file(),
        });

        if let Err(e) = invocation.clear_report() {
            return ExecutionOutcome::failed(e.into(), start.elapsed());
        }

        let command = invocation.command();
        let command_line = self
            .secrets
            .obfuscate(&command.to_shell_string(), &redactions);
        self.events.emit(&ExecutionEvent::ToolStarted {
            command_line: &command_line,
            working_dir: &invocation.working_dir,
        });

        let process = self.runner.run(&command).await;
        self.events.emit(&ExecutionEvent::ToolFinished {
            duration: process.duration,
            succeeded: process.success(),
        });

        let report_path = invocation.report_path.clone();
        let cleanup_warning = invocation
            .cleanup()
            .err()
            .map(|e| format!("failed to remove dotenv file: {}", e));

        let output = self.secrets.obfuscate(&process.output, &redactions);
        debug!("{} output:\n{}", self.runner.name(), output);

        let report = match self.read_report(&report_path).await {
            Ok(report) => report,
            Err(source) => {
                let mut result = NormalizedResult::new(Status::Error, Vec::new())
                    .with_duration(process.duration)
                    .with_output(output);
                if let Some(err) = &process.error {
                    result.append_error(err.to_string());
                }
                result.append_error(format!("failed to get test execution results: {}", source));
                if let Some(warning) = cleanup_warning {
                    result.append_warning(warning);
                }
                return ExecutionOutcome {
                    result,
                    error: Some(ExecutionError::ReportParse {
                        source,
                        process: process.error,
                    }),
                };
            }
        };
        self.events.emit(&ExecutionEvent::ReportParsed { path: &report_path });

        let mut result = map_report(&report, &output, process.error.as_ref());
        if result.duration.is_zero() {
            result.duration = process.duration;
        }
        if let Some(warning) = cleanup_warning {
            result.append_warning(warning);
        }

        let mut error = process.error.map(ExecutionError::Process);

        if let Some(scraper) = self.scraper.as_ref().filter(|_| self.config.scraper.enabled) {
            let artifacts = [report_path];
            match scraper.scrape(&request.id, &artifacts).await {
                Ok(()) => self.events.emit(&ExecutionEvent::ArtifactsScraped {
                    count: artifacts.len(),
                }),
                Err(e) => {
                    result.append_error(format!("scrape artifacts error: {}", e));
                    error = Some(ExecutionError::Scrape(e));
                }
            }
        }

        ExecutionOutcome { result, error }
    }

    /// Copies configured git credentials into the request's repository.
    fn inject_credentials(&self, request: &mut ExecutionRequest) {
        let git = &self.config.git;
        if !git.has_credentials() {
            return;
        }
        let Some(repo) = request
            .content
            .as_mut()
            .and_then(|content| content.repository.as_mut())
        else {
            return;
        };
        if let Some(username) = git.username.as_ref().filter(|u| !u.is_empty()) {
            repo.username = Some(username.clone());
        }
        if let Some(token) = git.token.as_ref().filter(|t| !t.is_empty()) {
            repo.token = Some(token.clone());
        }
        debug!("Injected git credentials for {}", repo.uri);
    }

    /// Variables whose values must be scrubbed from output.
    fn redactions(
        &self,
        request: &ExecutionRequest,
        variables: &[RuntimeVariable],
    ) -> Vec<RuntimeVariable> {
        let mut redactions = variables.to_vec();
        if let Some(token) = request.repository().and_then(|r| r.token.as_deref()) {
            redactions.push(RuntimeVariable::secret("git-token", token));
        }
        redactions
    }

    async fn read_report(&self, path: &Path) -> Result<RawReport, ReportParseError> {
        let attempts = self.config.runner.report_read_attempts.max(1);
        let delay = Duration::from_millis(self.config.runner.report_retry_delay_ms);

        let mut attempt = 1;
        loop {
            match report::read_report(path) {
                Ok(report) => return Ok(report),
                Err(e) if attempt < attempts => {
                    debug!(
                        "Report {} not ready (attempt {}/{}): {}",
                        path.display(),
                        attempt,
                        attempts,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
