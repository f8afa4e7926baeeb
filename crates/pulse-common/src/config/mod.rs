//! Configuration loading

mod gateway_config;

pub use gateway_config::{
    AppSettings, AuthConfig, ConfigError, Environment, GatewayConfig, HeartbeatConfig,
    RateLimitConfig, RateLimitRule, ServerConfig, SessionConfig,
};
