//! Quarry CLI: run tiered research tasks from the terminal.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Quarry: multi-engine research reports with tiered depth
#[derive(Parser, Debug)]
#[command(name = "quarry", version, about, long_about = None)]
pub(crate) struct Cli {
    /// Workspace directory (reads .quarry/config.toml from here)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Research a question and publish a report
    Research {
        /// The research question
        query: String,

        /// Subscription tier: free or premium
        #[arg(short, long, default_value = "free")]
        tier: String,

        /// Research mode: quick, standard or deep
        #[arg(short, long, default_value = "standard")]
        mode: String,

        /// Output formats, comma separated (pdf, docx, markdown, all)
        #[arg(short, long)]
        format: Option<String>,

        /// Citation style: basic, apa, mla or ieee
        #[arg(short, long, default_value = "basic")]
        citation: String,

        /// User id for daily quota accounting
        #[arg(short, long)]
        user: Option<String>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// List research modes and whether a tier unlocks them
    Modes {
        /// Subscription tier: free or premium
        #[arg(short, long, default_value = "free")]
        tier: String,
    },
    /// Show which search backends have credentials configured
    Engines,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Print the merged configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "quarry", "quarry")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "quarry.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace, cli.quiet).await
}
