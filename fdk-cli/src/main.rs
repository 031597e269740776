//! fdk - cached access to the FDK object catalog
//!
//! Every subcommand maps to one catalog operation. Results go to stdout
//! (tables, or JSON with `--json`); logs always go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use fdk_core::config::FdkConfig;
use fdk_core::FdkService;

mod commands;

use commands::Command;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "fdk",
    about = "Browse, search and cache the FDK object catalog",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Emit JSON logs with targets and line numbers (to stderr)
    #[clap(long, global = true)]
    trace: bool,

    /// Configuration file (default: <config dir>/config.yaml)
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Run without the persistent cache
    #[clap(long, global = true)]
    no_cache: bool,

    /// Print results as JSON
    #[clap(long, global = true)]
    json: bool,
}

fn initialize_tracing(log_level: &LogLevel, trace: bool) {
    let mut filter = EnvFilter::new(log_level.to_filter_directive());
    if trace {
        if let Ok(directive) = "fdk_core=trace".parse() {
            filter = filter.add_directive(directive);
        }
    }

    if trace {
        // JSON output for structured tracing - MUST go to stderr
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(cli: &Cli) -> Result<FdkConfig> {
    let mut config = match &cli.config {
        Some(path) => FdkConfig::load_with_env(Some(path.as_path()))
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => FdkConfig::load()?,
    };
    if cli.no_cache {
        config.cache.enabled = false;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(&cli.log_level, cli.trace);

    let config = load_config(&cli)?;
    let service = FdkService::from_config(config)?;

    commands::run(&service, cli.command, cli.json).await
}
