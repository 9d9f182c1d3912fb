//! `shelf`
//!
//! Command line client of Shelf. Parses the command, connects to the configured library backend and
//! hands the actual work to `shelf_core`.
use crate::cli::Cli;
use crate::state::AppState;
use anyhow::{Error, anyhow};
use clap::Parser as _;
use std::env;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt};
/// Command line definition
mod cli;
/// One function per subcommand
mod commands;
/// Settings, paths and the saved login
mod config;
/// Error types
mod errors;
/// Backend selection and library loading
mod state;

/// Entry point of the `shelf` binary.
#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Executed once per run, never across crate boundaries"
)]
#[allow(
    clippy::print_stderr,
    reason = "Tracing might not be available here if its initialization failed"
)]
pub async fn run() -> ExitCode {
    // Loaded before parsing so that `.env` values act as argument defaults
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    if let Err(error) = init_tracing() {
        eprintln!("Failed to set up logging: {error}");
    }
    match dotenv {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(error) => tracing::debug!("No .env file loaded: {error}"),
    }

    match run_safe(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("shelf: {error}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so they never mix with command output. `RUST_LOG` overrides the default
/// `info` level; records of the `log` facade used by `shelf_core` are forwarded to tracing.
fn init_tracing() -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow!(error))
}

/// Runs the command and, if the sync server rejected the saved login on the way, forgets it.
async fn run_safe(cli: Cli) -> Result<(), Error> {
    let mut state = AppState::open(cli.settings, env::var_os("HOME")).await?;
    let result = commands::execute(cli.command, &mut state).await;
    Ok(state.finish(result).await?)
}
