//! artillery-runner: runs Artillery load tests and normalizes their results.
//!
//! This crate turns a tool-agnostic execution request into an `artillery run`
//! invocation, runs it, and converts the JSON report into a normalized
//! pass/fail record.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Orchestrator**: Drives one execution through the pipeline
//! - **Invocation**: Builds the tool's command line and dotenv file
//! - **Report / Mapper**: Parse the JSON report and derive the result
//! - **Collaborators**: Content fetching, process running, secret redaction,
//!   artifact scraping and event sinks, each behind a trait
//!
//! # Example
//!
//! ```no_run
//! use artillery_runner::config::load_config;
//! use artillery_runner::content::LocalFetcher;
//! use artillery_runner::execution::ExecutionRequest;
//! use artillery_runner::orchestrator::Orchestrator;
//! use artillery_runner::process::local::LocalProcessRunner;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config(std::path::Path::new("artillery-runner.toml"))?;
//!     let request: ExecutionRequest =
//!         serde_json::from_str(&std::fs::read_to_string("execution.json")?)?;
//!
//!     let orchestrator = Orchestrator::new(
//!         &config,
//!         LocalFetcher::new(&config.runner.data_dir),
//!         LocalProcessRunner::new(),
//!     );
//!     let outcome = orchestrator.execute(&request).await;
//!     std::process::exit(outcome.result.status.exit_code());
//! }
//! ```

pub mod config;
pub mod content;
pub mod events;
pub mod execution;
pub mod invocation;
pub mod mapper;
pub mod orchestrator;
pub mod process;
pub mod report;
pub mod result;
pub mod scraper;
pub mod secret;

// Re-export commonly used types
pub use config::{Config, load_config};
pub use execution::{ContentDescriptor, ExecutionRequest, RuntimeVariable};
pub use orchestrator::{ExecutionError, ExecutionOutcome, Orchestrator};
pub use result::{NormalizedResult, Status, StepResult};
