//! Simulturn - Unified CLI
//!
//! Runs the session broker as an HTTP/WebSocket server.

#![warn(missing_docs)]

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use simulturn::{AppState, GameStore, MemoryStore, ServerConfig, SqliteStore};
use simulturn_board::SimultaneousClaim;
use std::sync::Arc;
use tracing::{info, instrument};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    initialize_tracing();

    match cli.command {
        Command::Serve {
            config,
            host,
            port,
            db,
            memory,
            host_reconnect,
        } => {
            let mut config = match config {
                Some(path) => ServerConfig::from_file(path)?,
                None => ServerConfig::default(),
            };
            if let Some(host) = host {
                config = config.with_bind_host(host);
            }
            if let Some(port) = port {
                config = config.with_port(port);
            }
            if let Some(db) = db {
                config = config.with_database(Some(db));
            }
            if memory {
                config = config.with_database(None);
            }
            if let Some(policy) = host_reconnect {
                config = config.with_host_reconnect(policy);
            }
            run_server(config).await
        }
    }
}

/// Run the HTTP/WebSocket game server
#[instrument(skip(config))]
async fn run_server(config: ServerConfig) -> Result<()> {
    config.validate()?;

    let store: Arc<dyn GameStore> = match config.database() {
        Some(path) => {
            info!(path = %path, "Using SQLite store");
            Arc::new(SqliteStore::open(path)?)
        }
        None => {
            info!("Using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };
    let policy = Arc::new(SimultaneousClaim::new(*config.board_size())?);

    let state = AppState::build(&config, store, policy);
    simulturn::serve(&config, state).await?;
    Ok(())
}

#[instrument]
fn initialize_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,simulturn=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Tracing initialized");
}
