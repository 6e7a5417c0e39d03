//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// RowSync CLI - Incremental API-to-database record mirroring
#[derive(Parser, Debug)]
#[command(name = "rowsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path (default: ~/.rowsync/config.json)
    #[arg(long, global = true, env = "ROWSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the config directory and a starter config file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Walk the id range, mirroring records into the database
    Run {
        /// Specify an id to start from, ignoring the saved cursor
        #[arg(short, long)]
        start: Option<u64>,

        /// End of the id range (exclusive), skipping range discovery
        #[arg(long)]
        max: Option<u64>,

        /// Specify a cycle delay in seconds between fetches
        #[arg(long)]
        delay: Option<f64>,
    },

    /// Show the sync cursor and the mirrored table
    Status,

    /// Delete the saved cursor so the next run starts fresh
    Reset,

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
