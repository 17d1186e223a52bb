//! Fairway relay entry point.

use anyhow::{Context, Result};
use fairway_relay::{resolve_config_path, RelayConfig, RelayServer};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = resolve_config_path();
    let config = RelayConfig::load_or_default(&config_path)
        .with_context(|| format!("loading relay config from {}", config_path.display()))?;
    info!(listen_addr = %config.server.listen_addr, "starting fairway relay");

    let server = RelayServer::new(config);
    let listener = server.bind().await.context("binding relay listener")?;

    let runner = {
        let server = server.clone();
        tokio::spawn(server.run(listener))
    };

    signal::ctrl_c().await.context("listening for shutdown signal")?;
    info!("shutdown signal received");

    server.shutdown();
    runner.await.context("relay task panicked")?;

    Ok(())
}
