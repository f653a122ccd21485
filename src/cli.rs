//! Command-line interface for simulturn.

use clap::{Parser, Subcommand};
use simulturn::HostReconnectPolicy;

/// Simulturn - simultaneous-move game server
#[derive(Parser, Debug)]
#[command(name = "simulturn")]
#[command(about = "Session broker and turn engine for host/player board games", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP/WebSocket game server
    Serve {
        /// Path to a TOML config file
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,

        /// Path to the SQLite database file (created if it doesn't exist)
        #[arg(long, conflicts_with = "memory")]
        db: Option<String>,

        /// Keep games in memory instead of SQLite
        #[arg(long)]
        memory: bool,

        /// What to do when a second host connects: replace or reject
        #[arg(long)]
        host_reconnect: Option<HostReconnectPolicy>,
    },
}
