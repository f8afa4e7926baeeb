//! Gateway server setup
//!
//! Provides the WebSocket server configuration and routes.

mod connection;
mod handler;
mod state;

pub use connection::ConnectionHandle;
pub use handler::gateway_handler;
pub use state::GatewayState;

use crate::protocol::GatewayMessage;
use crate::store::StorageView;
use axum::{routing::get, Router};
use pulse_common::{AppError, GatewayConfig};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// How often expired resumption records and idle rate buckets are purged
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Create the gateway router
pub fn create_router() -> Router<GatewayState> {
    Router::new()
        .route("/gateway", get(gateway_handler))
        .route("/health", get(health_check))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Build the complete application
pub fn create_app(state: GatewayState) -> Router {
    create_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Spawn the periodic maintenance task for a state
pub fn spawn_maintenance(state: GatewayState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
        loop {
            ticker.tick().await;
            state.resume_store().purge_expired();
            state.rate_limiter().purge_idle();
        }
    })
}

/// Run the gateway server until shutdown
pub async fn run_server(app: Router, addr: SocketAddr, state: GatewayState) -> Result<(), AppError> {
    tracing::info!("Starting gateway server on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Config(format!("Failed to bind to {addr}: {e}")))?;

    tracing::info!("Gateway listening on ws://{}/gateway", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .map_err(|e| AppError::Config(format!("Server error: {e}")))?;

    Ok(())
}

/// Wait for Ctrl-C, then ask every live session to reconnect so their
/// sessions get parked and resumed against the next instance.
async fn shutdown_signal(state: GatewayState) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }

    tracing::info!("Shutdown signal received");
    let notified = state
        .registry()
        .broadcast_frame(&GatewayMessage::reconnect());
    tracing::info!(notified, "RECONNECT sent to live sessions");
}

/// Run the complete gateway server with configuration
pub async fn run(config: GatewayConfig, storage: Arc<StorageView>) -> Result<(), AppError> {
    let host: IpAddr = config
        .server
        .host
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid GATEWAY_HOST: {e}")))?;
    let addr = SocketAddr::new(host, config.server.port);

    let state = GatewayState::new(config, storage);
    let maintenance = spawn_maintenance(state.clone());

    let app = create_app(state.clone());
    let result = run_server(app, addr, state).await;

    maintenance.abort();
    result
}
