//! tablesync CLI - Host for the incremental table replication worker
//!
//! Reads store locations from `TABLESYNC_*` variables (or `.env`), with
//! command-line flags taking precedence.

mod cli;
mod commands;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::resolve_settings;
use crate::commands::completions::run_completions;
use crate::commands::init::run_init;
use crate::commands::once::run_once;
use crate::commands::run::run_worker;
use crate::commands::status::run_status;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tablesync=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
        Commands::Init => run_init(&resolve_settings(&cli.stores)?).await?,
        Commands::Run => run_worker(resolve_settings(&cli.stores)?).await?,
        Commands::Once { json } => run_once(resolve_settings(&cli.stores)?, json).await?,
        Commands::Status { json } => run_status(&resolve_settings(&cli.stores)?, json).await?,
    }

    Ok(())
}
