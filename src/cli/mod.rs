//! CLI parser and command dispatch.

mod limits;
mod simulate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use scrapegate::AdmissionConfig;

#[derive(Parser)]
#[command(name = "scrapegate")]
#[command(about = "Admission control for scraping pipelines")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "SCRAPEGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective limits table
    Limits {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Push synthetic jobs through the queue and limiter, then report stats
    Simulate(simulate::SimulateArgs),
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AdmissionConfig::load_from_path(path).await?,
        None => AdmissionConfig::load().await,
    };

    match cli.command {
        Commands::Limits { json } => limits::cmd_limits(&config, json),
        Commands::Simulate(args) => simulate::cmd_simulate(&config, args).await,
    }
}
