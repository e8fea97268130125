// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "watchpost")]
#[command(about = "Motion-triggered capture and alert pipeline for security cameras")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Configuration file (default: ~/.config/watchpost/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at info level when RUST_LOG is not set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a camera and raise alerts until Ctrl+C
    Run {
        /// Frame source: v4l2:<device>, dir:<path> or dir-loop:<path>
        #[arg(short, long, default_value = "v4l2:/dev/video0")]
        source: String,

        /// Keep alerts in memory and only log notifications
        #[arg(long)]
        dry_run: bool,

        /// Motion sensitivity preset (low, medium, high)
        #[arg(long)]
        sensitivity: Option<String>,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,
    },

    /// Summarize stored alerts
    Analytics {
        /// Number of recent alerts to list
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Only alerts of this category
        #[arg(long)]
        category: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Delete alerts and captures older than the retention period
    Purge {
        /// Retention in days (default: retention_days from the configuration)
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Sample CPU, memory and capture disk usage
    Health {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Write it to the configuration file
        #[arg(long)]
        write: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Set RUST_LOG to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=watchpost=trace
    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run {
            source,
            dry_run,
            sensitivity,
            duration,
        } => cli::run(config_path, &source, dry_run, sensitivity.as_deref(), duration),
        Commands::Analytics {
            limit,
            category,
            json,
        } => cli::analytics(config_path, limit, category.as_deref(), json),
        Commands::Purge { days } => cli::purge(config_path, days),
        Commands::Health { json } => cli::health(config_path, json),
        Commands::Config { write } => cli::show_config(config_path, write),
    }
}
