//! Command-line interface for strictly_grid_server.

use crate::config::DisconnectPolicy;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Strictly Grid - authoritative N x N grid game server
#[derive(Parser, Debug)]
#[command(name = "strictly_grid_server")]
#[command(about = "Real-time two-player grid game server", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the game server
    Serve {
        /// Path to the TOML config file (defaults apply if it does not exist)
        #[arg(short, long, default_value = "strictly_grid.toml")]
        config: PathBuf,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,

        /// Disconnect handling
        #[arg(long, value_enum)]
        disconnect_policy: Option<DisconnectPolicy>,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Path to the TOML config file
        #[arg(short, long, default_value = "strictly_grid.toml")]
        config: PathBuf,
    },
}
