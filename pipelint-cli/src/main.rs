//! Pipelint CLI: analyze pre-parsed modeling pipelines for workflow
//! anti-patterns and print a compliance report.

mod commands;

use clap::Parser;
use pipelint_core::ReportFormat;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Pipelint: workflow compliance checks for ML pipelines
#[derive(Parser, Debug)]
#[command(name = "pipelint", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (searched for .pipelint/config.toml)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write JSON logs to daily files in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Analyze a pipeline and emit a compliance report
    Analyze {
        /// Pipeline JSON file ("-" reads stdin)
        pipeline: PathBuf,
        /// Report format: json, sarif, markdown
        #[arg(short, long)]
        format: Option<ReportFormat>,
        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Evaluate rules in parallel
        #[arg(long)]
        parallel: bool,
        /// Exit with an error when the score is below this value
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        fail_under: Option<u8>,
        /// Rule ids to disable for this run (repeatable)
        #[arg(long = "disable", value_name = "RULE")]
        disabled: Vec<String>,
    },
    /// List the rule catalog
    Rules {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the artifact lineage of a pipeline as JSON
    Lineage {
        /// Pipeline JSON file ("-" reads stdin)
        pipeline: PathBuf,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum ConfigAction {
    /// Create a default .pipelint/config.toml in the workspace
    Init,
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // Human-readable layer for stderr; stdout carries the report
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    // Optional JSON file layer for structured logging
    let mut _guard = None;
    let json_layer = match &cli.log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir)?;
            let file_appender = tracing_appender::rolling::daily(log_dir, "pipelint.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            _guard = Some(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_filter(EnvFilter::new("debug")),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    // Resolve workspace
    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| cli.workspace.clone());

    commands::handle_command(cli.command, &workspace, cli.config.as_deref()).await
}
