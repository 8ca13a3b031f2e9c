use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "tablesync")]
#[command(about = "Replicate a source table into a clone, incrementally")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub stores: StoreArgs,
}

/// Overrides for the `TABLESYNC_*` environment variables
#[derive(Args, Debug, Default, Clone)]
pub struct StoreArgs {
    /// Source store: file path, `:memory:` or libsql/https URL
    #[arg(long, global = true, value_name = "URL")]
    pub source: Option<String>,

    /// Target (clone) store: file path, `:memory:` or libsql/https URL
    #[arg(long, global = true, value_name = "URL")]
    pub target: Option<String>,

    /// Auth token for a remote source store
    #[arg(long, global = true, value_name = "TOKEN")]
    pub source_auth_token: Option<String>,

    /// Auth token for a remote target store
    #[arg(long, global = true, value_name = "TOKEN")]
    pub target_auth_token: Option<String>,

    /// Seconds to sleep between cycles
    #[arg(long, global = true, value_name = "SECS")]
    pub interval_secs: Option<u64>,

    /// Candidate count at which the bulk path is used
    #[arg(long, global = true, value_name = "ROWS")]
    pub bulk_threshold: Option<usize>,

    /// Rows written per bulk-load statement
    #[arg(long, global = true, value_name = "ROWS")]
    pub bulk_batch_size: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the replicated table in both stores if missing
    Init,
    /// Run the sync worker until interrupted
    Run,
    /// Run a single sync cycle
    Once {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show row counts and the current cursor
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
