pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check remaining tickets for one or more event pages
    Check {
        /// Event page URLs; each argument may be a comma-separated list
        #[arg(required = true)]
        urls: Vec<String>,

        /// Pages fetched at the same time
        #[arg(long)]
        concurrency: Option<usize>,

        /// Attempts per page
        #[arg(long)]
        retries: Option<u32>,

        /// Print compact JSON instead of pretty-printed
        #[arg(long)]
        compact: bool,
    },

    /// Serve the status API over HTTP
    Serve {
        /// Address to listen on
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Show the effective configuration
    Config {
        /// Only print where the default configuration lives
        #[arg(long)]
        path: bool,
    },
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Commands::Check { urls, concurrency, retries, compact } => {
            info!("Checking {} URL argument(s)", urls.len());
            commands::check(config_path, urls, concurrency, retries, compact).await
        }
        Commands::Serve { bind } => {
            info!("Starting status server");
            commands::serve(config_path, bind).await
        }
        Commands::Config { path } => {
            if path {
                commands::show_config_path(config_path)
            } else {
                commands::show_config(config_path)
            }
        }
    }
}
