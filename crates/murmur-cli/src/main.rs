//! murmur model manager
//!
//! Command-line front end over the model lifecycle manager

mod cli;
mod commands;
mod state;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use state::AppState;

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so JSON output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("murmur error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let state = AppState::new(&cli).await?;

    let result = match &cli.command {
        Command::List { json } => commands::list_models(&state, *json).await,
        Command::Info { id, json } => commands::get_model_info(&state, id, *json).await,
        Command::Download { id, force } => commands::download_model(&state, id, *force).await,
        Command::Delete { id } => commands::delete_model(&state, id).await,
        Command::Disk => commands::disk_usage(&state).await,
    };

    state.model_manager.shutdown().await;
    result
}
