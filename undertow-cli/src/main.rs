//! Undertow CLI - Command-line interface
//!
//! Runs the streaming server or converts subtitle files offline.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use undertow_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "undertow")]
#[command(about = "Stream torrent media to the browser with subtitles")]
#[command(version)]
struct Cli {
    /// Console log level
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info, global = true)]
    log_level: CliLogLevel,

    /// Directory for the per-run log file
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_file = init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())?;
    tracing::debug!(path = %log_file.display(), "Writing full trace log");

    commands::handle_command(cli.command).await
}
