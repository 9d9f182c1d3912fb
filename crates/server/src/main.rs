//! The main function of the Shelf sync server
use anyhow::Context as _;
use clap::Parser;
use shelf_core::persistence::sqlite::SqliteBackend;
use shelf_server::auth::UserList;
use shelf_server::{ServerState, router, serve};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Keeps Shelf libraries in sync between devices.
#[derive(Debug, Parser)]
#[command(name = "shelf-server", version, about)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "SHELF_SERVER_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// SQLite database holding all libraries.
    #[arg(long, env = "SHELF_SERVER_DB", default_value = "shelf-server.db")]
    db: PathBuf,

    /// Accounts as comma-separated `username:password` pairs.
    #[arg(long, env = "SHELF_SERVER_USERS", hide_env_values = true)]
    users: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .try_init()
        .map_err(|error| anyhow::anyhow!(error))?;
    if let Err(error) = dotenv {
        tracing::debug!("No .env file loaded: {error}");
    }

    let users = UserList::parse(&args.users).context("Invalid SHELF_SERVER_USERS")?;
    if users.is_empty() {
        tracing::warn!("No users configured, every library request will be rejected");
    }
    let backend = SqliteBackend::init(&args.db)
        .await
        .with_context(|| format!("Failed to open database {}", args.db.display()))?;

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    let state = ServerState::new(backend, users);
    serve(listener, router(state)).await?;
    Ok(())
}
