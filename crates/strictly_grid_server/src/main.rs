//! Strictly Grid server binary.

use anyhow::Result;
use clap::Parser;
use strictly_grid_server::cli::{Cli, Command};
use strictly_grid_server::{GameHub, ServerConfig, router};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,strictly_grid_server=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            host,
            port,
            disconnect_policy,
        } => {
            let config =
                ServerConfig::load(Some(config.as_path()))?.with_overrides(host, port, disconnect_policy);
            run_server(config).await
        }
        Command::Config { config } => {
            let config = ServerConfig::load(Some(config.as_path()))?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Run the game server until the listener fails.
async fn run_server(config: ServerConfig) -> Result<()> {
    let address = config.bind_address();
    info!(
        address = %address,
        policy = %config.disconnect_policy(),
        grace_secs = config.grace_period_secs(),
        "Starting Strictly Grid server"
    );

    let (hub, handle) = GameHub::new(config);
    tokio::spawn(hub.run());

    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Server ready at http://{}/ (WebSocket at /ws)", address);

    axum::serve(listener, router(handle)).await?;
    Ok(())
}
