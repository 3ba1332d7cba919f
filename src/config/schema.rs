//! Configuration schema definitions for artillery-runner.
//!
//! This module defines all configuration types that can be deserialized from
//! TOML configuration files. Every section is optional and falls back to
//! defaults, so an empty file is a valid configuration.
//!
//! # Schema Overview
//!
//! ```text
//! Config (root)
//! ├── RunnerConfig           - Tool invocation (executable, dirs, variables, timeouts)
//! ├── GitConfig              - Credentials injected into repository content
//! └── ScraperConfig          - Artifact archiving
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Root configuration structure for artillery-runner.
///
/// # TOML Structure
///
/// ```toml
/// [runner]
/// executable = "artillery"
/// data_dir = "/data"
/// variable_injection = "dotenv"
///
/// [git]
/// username = "ci-bot"
/// token = "ghp_..."
///
/// [scraper]
/// enabled = true
/// storage_dir = "/data/artifacts"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Settings for invoking the load-testing tool.
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Credentials applied to repository-backed content.
    #[serde(default)]
    pub git: GitConfig,

    /// Artifact archiving settings.
    #[serde(default)]
    pub scraper: ScraperConfig,
}

impl Config {
    /// Expands `~` and environment references in configured paths.
    ///
    /// Paths that fail to expand are kept verbatim.
    pub fn expanded(mut self) -> Self {
        self.runner.data_dir = expand_path(&self.runner.data_dir);
        self.runner.transient_dir = expand_path(&self.runner.transient_dir);
        if let Some(dir) = &self.scraper.storage_dir {
            self.scraper.storage_dir = Some(expand_path(dir));
        }
        self
    }
}

fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        Err(_) => path.to_path_buf(),
    }
}

/// How runtime variables reach the load-testing tool.
///
/// Exactly one policy is active per deployment, so every execution injects
/// variables the same way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableInjection {
    /// Write a transient `NAME=VALUE` file and pass `--dotenv <file>`.
    #[default]
    Dotenv,

    /// Pass each variable as a positional `NAME=VALUE` argument.
    Inline,
}

/// Settings for invoking the load-testing tool.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `executable` | `artillery` |
/// | `data_dir` | `/data` |
/// | `transient_dir` | system temp dir |
/// | `variable_injection` | `dotenv` |
/// | `report_file` | `test-report.json` |
/// | `timeout_secs` | None (no timeout) |
/// | `report_read_attempts` | 1 |
/// | `report_retry_delay_ms` | 500 |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunnerConfig {
    /// Name or path of the load-testing executable.
    #[serde(default = "default_executable")]
    pub executable: String,

    /// Root directory for fetched content.
    ///
    /// Repository checkouts live under `<data_dir>/repo`, which is also the
    /// base for repository working-directory overrides.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory for transient files such as generated dotenv files.
    #[serde(default = "default_transient_dir")]
    pub transient_dir: PathBuf,

    /// Variable injection policy.
    #[serde(default)]
    pub variable_injection: VariableInjection,

    /// File name of the JSON report, relative to the working directory.
    #[serde(default = "default_report_file")]
    pub report_file: String,

    /// Kill the tool if it runs longer than this many seconds.
    pub timeout_secs: Option<u64>,

    /// How many times to try reading the report before giving up.
    ///
    /// The tool may still be flushing the report when it exits. Values
    /// below 1 are treated as 1.
    #[serde(default = "default_report_read_attempts")]
    pub report_read_attempts: u32,

    /// Delay between report read attempts, in milliseconds.
    #[serde(default = "default_report_retry_delay_ms")]
    pub report_retry_delay_ms: u64,

    /// Extra environment variables for the tool process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            data_dir: default_data_dir(),
            transient_dir: default_transient_dir(),
            variable_injection: VariableInjection::default(),
            report_file: default_report_file(),
            timeout_secs: None,
            report_read_attempts: default_report_read_attempts(),
            report_retry_delay_ms: default_report_retry_delay_ms(),
            env: BTreeMap::new(),
        }
    }
}

fn default_executable() -> String {
    "artillery".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/data")
}

fn default_transient_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_report_file() -> String {
    "test-report.json".to_string()
}

fn default_report_read_attempts() -> u32 {
    1
}

fn default_report_retry_delay_ms() -> u64 {
    500
}

/// Git credentials injected into repository content descriptors.
///
/// Credentials are copied into the execution's own request and never
/// written back to shared state.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GitConfig {
    pub username: Option<String>,
    pub token: Option<String>,
}

impl GitConfig {
    /// Returns `true` if either a username or a token is configured.
    pub fn has_credentials(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        set(&self.username) || set(&self.token)
    }
}

/// Artifact archiving settings.
///
/// Scraping runs only when `enabled` is set and a scraper is attached to the
/// orchestrator. The binary attaches a directory scraper when `storage_dir`
/// is configured.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Root directory for archived artifacts.
    pub storage_dir: Option<PathBuf>,
}
