use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the persisted history
    #[arg(short, long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List committed transactions
    Transactions {
        /// Only transactions issued by this actor
        #[arg(short, long)]
        actor: Option<String>,
    },

    /// List the versions of one record
    Versions {
        /// Record type name
        record_type: String,

        /// Primary key; comma-separated for composite keys
        key: String,
    },

    /// Show what a transaction changed
    Changes {
        /// Transaction id
        transaction_id: u64,
    },

    /// Diff two versions of a record
    Diff {
        /// Record type name
        record_type: String,

        /// Primary key; comma-separated for composite keys
        key: String,

        /// Version to diff from
        from: u64,

        /// Version to diff to
        to: u64,
    },

    /// Load the history and check checksums and invariants
    Verify,
}
