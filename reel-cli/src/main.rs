//! Reel CLI - Command-line interface
//!
//! Serves the catalog over HTTP and manages its contents.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use reel_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "reel")]
#[command(about = "A byte-range video streaming origin server")]
struct Cli {
    /// Console log level; the full trace always goes to the run log
    #[arg(long, global = true, value_enum, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    /// Directory for the run log
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    /// Media directory (overrides REEL_MEDIA_DIR)
    #[arg(long, global = true)]
    media_dir: Option<PathBuf>,

    /// Catalog file (overrides REEL_CATALOG_PATH)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref()) {
        eprintln!("Error: cannot set up logging: {e}");
        return ExitCode::FAILURE;
    }

    let paths = commands::PathOverrides {
        media_dir: cli.media_dir,
        catalog: cli.catalog,
    };
    match commands::handle_command(cli.command, paths).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("Error: {}", e.user_message());
            if e.is_user_error() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
