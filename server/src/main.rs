use clap::Parser;
use log::info;
use server::app::{build_auth, build_repository, Server};
use server::config::ServerConfig;

/// Main-method of the application.
/// Parses configuration, starts every server task and runs until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::parse();
    config.validate()?;

    let auth = build_auth(&config)?;
    let repository = build_repository(&config).await?;

    info!(
        "Starting server: {} Hz, full update every {} ticks, {:?} repository, {:?} auth",
        config.tick_rate, config.game_update_interval, config.repository, config.auth
    );
    let server = Server::start(&config, auth, repository).await?;

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down gracefully...");
    server.shutdown().await;

    Ok(())
}
