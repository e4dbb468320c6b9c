//! Stratum server entry point.

use anyhow::Result;
use stratum_server::{CONFIG_FILE, ServerConfig, bootstrap};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stratum=info")),
        )
        .json()
        .init();

    tracing::info!("Starting Stratum server...");
    let config = ServerConfig::load(CONFIG_FILE)?;
    let app = bootstrap(config).await?;
    tracing::info!(
        system_tenant_id = app.seed.system_tenant_id,
        "Stratum server ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    app.shutdown().await;

    tracing::info!("Stratum server stopped.");
    Ok(())
}
