//! Polyhouse Controller - Main Entry Point

use api::{init_logging, run_server, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    info!("=== Polyhouse Controller v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Storage backend: {:?}, thresholds: exhaust > {} / sprinkler > {}",
        config.storage.backend, config.control.exhaust_above, config.control.sprinkler_above
    );

    run_server(config).await
}
