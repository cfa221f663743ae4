//! TideKV - A Small In-Memory Key-Value Server
//!
//! This is the main entry point for the TideKV server.
//! It parses the command line, sets up logging and runs the server
//! until Ctrl+C.

use clap::Parser;
use tidekv::{Cli, Config, Server};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = Config::from(&cli);
    info!(
        version = tidekv::VERSION,
        bind = %config.bind_address(),
        reaper_interval_ms = config.reaper_interval.as_millis() as u64,
        "Starting TideKV"
    );

    let server = Server::bind(&config).await?;

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    server.run_until(shutdown).await;
    Ok(())
}
