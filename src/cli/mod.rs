//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::sync::Strategy;

pub mod commands;

/// importsync - reconcile a destination dataset with a source feed
#[derive(Parser, Debug)]
#[command(name = "importsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.importsync/config.json)
    #[arg(long, global = true, env = "IMPORTSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Reconcile and report without writing the database or --output
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile a destination with a source
    Sync(SyncArgs),

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

/// Arguments of `importsync sync`.
///
/// Inputs ending in `.csv` or `.tsv` are read as delimited text, anything
/// else as JSONL (one JSON object per line).
#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Source records (the state to converge to)
    #[arg(long, short = 's')]
    pub source: PathBuf,

    /// Destination records file
    #[arg(long, short = 'd', conflicts_with = "db", required_unless_present = "db")]
    pub destination: Option<PathBuf>,

    /// Destination SQLite database (changes are applied per chunk)
    #[arg(long, requires = "table")]
    pub db: Option<PathBuf>,

    /// Destination table in --db
    #[arg(long, requires = "db")]
    pub table: Option<String>,

    /// Key field(s), in key order
    #[arg(long = "key", short = 'k', value_delimiter = ',')]
    pub key: Vec<String>,

    /// Content field(s) (default: every non-key field; required with --db)
    #[arg(long = "content", short = 'c', value_delimiter = ',')]
    pub content: Vec<String>,

    /// Reconciliation strategy
    #[arg(long, value_enum)]
    pub strategy: Option<Strategy>,

    /// Elements per chunk
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Inputs are not sorted by key: load everything in a single pass
    #[arg(long)]
    pub unsorted: bool,

    /// Delimited inputs have no header row (fields are named 0, 1, ...)
    #[arg(long)]
    pub no_header: bool,

    /// Read integers in delimited inputs as numbers and empty cells as null
    #[arg(long)]
    pub typed: bool,

    /// Write the reconciled destination as JSONL
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Write a JSONL change log (added / changed / removed records)
    #[arg(long)]
    pub changes: Option<PathBuf>,
}
