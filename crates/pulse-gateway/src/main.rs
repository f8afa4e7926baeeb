//! Gateway server entry point
//!
//! Run with:
//! ```bash
//! cargo run -p pulse-gateway
//! ```
//!
//! Configuration is loaded from environment variables.

use pulse_common::{try_init_tracing, GatewayConfig, TracingConfig};
use pulse_gateway::store::StorageView;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Gateway failed to start");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = GatewayConfig::from_env()?;

    let tracing_config = TracingConfig::for_environment(config.app.env);
    if let Err(e) = try_init_tracing(&tracing_config) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        env = ?config.app.env,
        port = config.server.port,
        "Configuration loaded"
    );

    let storage = StorageView::new_shared();
    pulse_gateway::run(config, storage).await?;

    Ok(())
}
