//! Configuration loading and schema definitions for artillery-runner.
//!
//! Configuration is loaded once at process start and handed to the
//! [`Orchestrator`](crate::orchestrator::Orchestrator) by reference. Nothing
//! in the crate reads configuration from ambient globals.
//!
//! # The Configuration File Format is described in [`schema`].

pub mod schema;

pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result};

/// Loads configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read (e.g., doesn't exist or permission denied)
/// - The file contains invalid TOML syntax
/// - The configuration doesn't match the expected schema
///
/// # Example
///
/// ```no_run
/// use artillery_runner::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("artillery-runner.toml"))?;
/// println!("Executable: {}", config.runner.executable);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config.expanded())
}

/// Loads configuration from a TOML string.
///
/// # Example
///
/// ```
/// use artillery_runner::config::{load_config_str, VariableInjection};
///
/// let config = load_config_str(r#"
///     [runner]
///     data_dir = "/data"
///     variable_injection = "inline"
///
///     [scraper]
///     enabled = true
///     storage_dir = "/data/artifacts"
/// "#)?;
///
/// assert_eq!(config.runner.variable_injection, VariableInjection::Inline);
/// assert!(config.scraper.enabled);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    Ok(config.expanded())
}
