//! artillery-runner CLI - Run Artillery load tests and normalize the results.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use artillery_runner::config::{self, Config};
use artillery_runner::content::LocalFetcher;
use artillery_runner::events::TracingSink;
use artillery_runner::execution::ExecutionRequest;
use artillery_runner::orchestrator::Orchestrator;
use artillery_runner::process::local::LocalProcessRunner;
use artillery_runner::result::print_summary;
use artillery_runner::scraper::DirectoryScraper;

const DEFAULT_CONFIG: &str = "artillery-runner.toml";

#[derive(Parser)]
#[command(name = "artillery-runner")]
#[command(about = "Run Artillery load tests and normalize their results", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one execution
    Run {
        /// Execution request JSON file, or - for stdin
        execution: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Validate configuration file
    Validate,

    /// Initialize a new configuration file
    Init,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run { execution, format } => run_execution(&cli.config, &execution, format).await,
        Commands::Validate => validate_config(&cli.config),
        Commands::Init => init_config(),
    }
}

/// Loads the config file, falling back to defaults when it does not exist.
fn load_or_default(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        info!(
            "No config file at {}, using defaults",
            config_path.display()
        );
        return Ok(Config::default().expanded());
    }
    let config = config::load_config(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    info!("Loaded configuration from {}", config_path.display());
    Ok(config)
}

fn read_request(source: &str) -> Result<ExecutionRequest> {
    let content = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read execution request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read execution request: {}", source))?
    };
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse execution request: {}", source))
}

async fn run_execution(config_path: &Path, source: &str, format: Format) -> Result<()> {
    let config = load_or_default(config_path)?;
    let request = read_request(source)?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping load test");
            ctrl_c.cancel();
        }
    });

    let runner = LocalProcessRunner::new().with_cancellation_token(cancel);
    let fetcher = LocalFetcher::new(&config.runner.data_dir);
    let mut orchestrator = Orchestrator::new(&config, fetcher, runner).with_events(TracingSink);

    if config.scraper.enabled {
        match &config.scraper.storage_dir {
            Some(dir) => orchestrator = orchestrator.with_scraper(DirectoryScraper::new(dir)),
            None => warn!("Scraping is enabled but no storage_dir is configured; skipping"),
        }
    }

    let outcome = orchestrator.execute(&request).await;
    if outcome.success() {
        info!("Execution completed without errors");
    }

    match format {
        Format::Json => {
            let json = serde_json::to_string_pretty(&outcome.result)?;
            println!("{}", json);
        }
        Format::Text => print_summary(&outcome.result),
    }

    std::process::exit(outcome.result.status.exit_code());
}

fn validate_config(config_path: &Path) -> Result<()> {
    match config::load_config(config_path) {
        Ok(config) => {
            println!("Configuration is valid!");
            println!();
            println!("Settings:");
            println!("  Executable: {}", config.runner.executable);
            println!("  Data dir: {}", config.runner.data_dir.display());
            println!("  Transient dir: {}", config.runner.transient_dir.display());
            let injection = match config.runner.variable_injection {
                config::VariableInjection::Dotenv => "dotenv",
                config::VariableInjection::Inline => "inline",
            };
            println!("  Variable injection: {}", injection);
            println!("  Report file: {}", config.runner.report_file);
            match config.runner.timeout_secs {
                Some(secs) => println!("  Timeout: {}s", secs),
                None => println!("  Timeout: none"),
            }
            println!(
                "  Git credentials: {}",
                if config.git.has_credentials() {
                    "configured"
                } else {
                    "none"
                }
            );
            println!(
                "  Scraper: {}",
                if config.scraper.enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );

            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn init_config() -> Result<()> {
    let config = r#"# artillery-runner configuration file

[runner]
executable = "artillery"
data_dir = "/data"
# Either "dotenv" (write a transient .env file) or "inline" (NAME=VALUE args)
variable_injection = "dotenv"
report_file = "test-report.json"
# Kill the load test after this many seconds
# timeout_secs = 3600
# Retry reading the report while the tool finishes writing it
report_read_attempts = 3
report_retry_delay_ms = 500

[runner.env]
# NODE_OPTIONS = "--max-old-space-size=4096"

[git]
# username = "ci-bot"
# token = "ghp_..."

[scraper]
enabled = false
storage_dir = "/data/artifacts"
"#;

    let path = PathBuf::from(DEFAULT_CONFIG);
    if path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit manually.",
            DEFAULT_CONFIG
        );
        std::process::exit(1);
    }

    std::fs::write(&path, config)?;
    println!("Created {}", DEFAULT_CONFIG);
    println!();
    println!("Edit the configuration as needed, then run:");
    println!("  artillery-runner run execution.json");

    Ok(())
}
