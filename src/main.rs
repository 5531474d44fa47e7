mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use reunite::config::ReuniteConfig;

#[derive(Parser)]
#[command(name = "reunite", version, about = "Entity-resolution matching engine for lost & found records")]
struct Cli {
    /// Config file (defaults to ~/.reunite/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scan scheduler until Ctrl-C
    Serve,
    /// Run exactly one scan pass and print its summary
    Scan {
        /// Print the full summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import subject records from a JSON file
    Import {
        /// Path to a file of the form {"subjects": [...]}
        file: PathBuf,
    },
    /// List recorded matches, newest first
    Matches {
        /// Only show matches with this status
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show subject and match counts
    Stats,
    /// Check database health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ReuniteConfig::load_from(path)?,
        None => ReuniteConfig::load()?,
    };

    // Log to stderr so stdout stays clean for command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => cli::serve::serve(config).await?,
        Command::Scan { json } => cli::scan::scan(&config, json).await?,
        Command::Import { file } => cli::import::import(&config, &file)?,
        Command::Matches { status, limit } => {
            cli::matches::matches(&config, status.as_deref(), limit)?
        }
        Command::Stats => cli::stats::stats(&config)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
