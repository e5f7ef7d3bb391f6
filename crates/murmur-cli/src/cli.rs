//! Command-line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Manage the speech and language models murmur runs offline
#[derive(Debug, Parser)]
#[command(name = "murmur", version, about)]
pub struct Cli {
    /// Data directory holding models and the registry snapshot
    #[arg(long, global = true, env = "MURMUR_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// JSON catalog to use instead of the built-in one
    #[arg(long, global = true, env = "MURMUR_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Seconds to wait for a download connection
    #[arg(long, global = true, env = "MURMUR_CONNECT_TIMEOUT", default_value_t = 30)]
    pub connect_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List catalog models and their status
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one model
    Info {
        id: String,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Download and verify a model
    Download {
        id: String,
        /// Start even if the volume looks too small
        #[arg(long)]
        force: bool,
    },
    /// Delete an installed model
    Delete { id: String },
    /// Show free space and space used by models
    Disk,
}
