//! # pulse-common
//!
//! Shared utilities including configuration, error handling, authentication, and telemetry.

pub mod auth;
pub mod config;
pub mod error;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use auth::{Claims, TokenService};
pub use config::{
    AppSettings, AuthConfig, ConfigError, Environment, GatewayConfig, HeartbeatConfig,
    RateLimitConfig, RateLimitRule, ServerConfig, SessionConfig,
};
pub use error::{AppError, AppResult};
pub use telemetry::{init_tracing, try_init_tracing, TracingConfig, TracingError};
