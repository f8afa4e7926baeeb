//! Gateway configuration
//!
//! Loads configuration from environment variables (with `.env` support).

use serde::Deserialize;
use std::env;

/// Full gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub app: AppSettings,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub heartbeat: HeartbeatConfig,
    pub session: SessionConfig,
    pub rate_limit: RateLimitConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Listen address for the websocket server
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Token validation settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_token_expiry")]
    pub token_expiry_secs: i64,
}

/// Heartbeat timing
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    /// Interval advertised in HELLO, in milliseconds
    #[serde(default = "default_heartbeat_interval_ms")]
    pub interval_ms: u64,
}

impl HeartbeatConfig {
    /// Grace window before a silent connection is considered dead:
    /// twice the advertised interval.
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.interval_ms * 2
    }
}

/// Session lifecycle settings
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// How long an unauthenticated connection may sit before being closed
    #[serde(default = "default_identify_timeout_secs")]
    pub identify_timeout_secs: u64,
    /// How long a disconnected session stays resumable
    #[serde(default = "default_resume_ttl_secs")]
    pub resume_ttl_secs: u64,
    /// Replay buffer capacity per resumable session; oldest events drop first
    #[serde(default = "default_max_buffered_events")]
    pub max_buffered_events: usize,
    /// Outbound queue capacity per live session
    #[serde(default = "default_send_queue_size")]
    pub send_queue_size: usize,
}

/// A single sliding-window rate limit: `limit` actions per `window_secs`
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitRule {
    pub limit: u32,
    pub window_secs: u64,
}

/// Per-action rate limits
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_identify_rule")]
    pub identify: RateLimitRule,
    #[serde(default = "default_resume_rule")]
    pub resume: RateLimitRule,
    #[serde(default = "default_presence_rule")]
    pub presence_update: RateLimitRule,
    #[serde(default = "default_lazy_request_rule")]
    pub lazy_request: RateLimitRule,
    /// Overall inbound frame budget per connection
    #[serde(default = "default_recv_rule")]
    pub recv: RateLimitRule,
}

// Default value functions
fn default_app_name() -> String {
    "pulse-gateway".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_token_expiry() -> i64 {
    604_800 // 7 days
}

fn default_heartbeat_interval_ms() -> u64 {
    41_250
}

fn default_identify_timeout_secs() -> u64 {
    30
}

fn default_resume_ttl_secs() -> u64 {
    120
}

fn default_max_buffered_events() -> usize {
    250
}

fn default_send_queue_size() -> usize {
    256
}

fn default_identify_rule() -> RateLimitRule {
    RateLimitRule {
        limit: 1,
        window_secs: 5,
    }
}

fn default_resume_rule() -> RateLimitRule {
    RateLimitRule {
        limit: 5,
        window_secs: 60,
    }
}

fn default_presence_rule() -> RateLimitRule {
    RateLimitRule {
        limit: 5,
        window_secs: 60,
    }
}

fn default_lazy_request_rule() -> RateLimitRule {
    RateLimitRule {
        limit: 10,
        window_secs: 60,
    }
}

fn default_recv_rule() -> RateLimitRule {
    RateLimitRule {
        limit: 120,
        window_secs: 60,
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env: env::var("APP_ENV")
                    .ok()
                    .and_then(|s| match s.to_lowercase().as_str() {
                        "production" => Some(Environment::Production),
                        "staging" => Some(Environment::Staging),
                        "development" => Some(Environment::Development),
                        _ => None,
                    })
                    .unwrap_or_default(),
            },
            server: ServerConfig {
                host: env::var("GATEWAY_HOST").unwrap_or_else(|_| default_host()),
                port: env::var("GATEWAY_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or(ConfigError::MissingVar("GATEWAY_PORT"))?,
            },
            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET")
                    .map_err(|_| ConfigError::MissingVar("JWT_SECRET"))?,
                token_expiry_secs: env::var("TOKEN_EXPIRY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_token_expiry),
            },
            heartbeat: HeartbeatConfig {
                interval_ms: env::var("HEARTBEAT_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_heartbeat_interval_ms),
            },
            session: SessionConfig {
                identify_timeout_secs: env::var("IDENTIFY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_identify_timeout_secs),
                resume_ttl_secs: env::var("RESUME_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_resume_ttl_secs),
                max_buffered_events: env::var("MAX_BUFFERED_EVENTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_max_buffered_events),
                send_queue_size: env::var("SEND_QUEUE_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_send_queue_size),
            },
            rate_limit: RateLimitConfig {
                identify: rule_from_env("RATE_LIMIT_IDENTIFY", default_identify_rule()),
                resume: rule_from_env("RATE_LIMIT_RESUME", default_resume_rule()),
                presence_update: rule_from_env("RATE_LIMIT_PRESENCE", default_presence_rule()),
                lazy_request: rule_from_env("RATE_LIMIT_LAZY_REQUEST", default_lazy_request_rule()),
                recv: rule_from_env("RATE_LIMIT_RECV", default_recv_rule()),
            },
        })
    }

    /// A configuration suitable for tests: loopback server, short windows.
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            app: AppSettings {
                name: default_app_name(),
                env: Environment::Development,
            },
            server: ServerConfig {
                host: default_host(),
                port: 0,
            },
            auth: AuthConfig {
                jwt_secret: "test-secret-key-that-is-long-enough".to_string(),
                token_expiry_secs: default_token_expiry(),
            },
            heartbeat: HeartbeatConfig {
                interval_ms: default_heartbeat_interval_ms(),
            },
            session: SessionConfig {
                identify_timeout_secs: default_identify_timeout_secs(),
                resume_ttl_secs: default_resume_ttl_secs(),
                max_buffered_events: default_max_buffered_events(),
                send_queue_size: default_send_queue_size(),
            },
            rate_limit: RateLimitConfig {
                identify: default_identify_rule(),
                resume: default_resume_rule(),
                presence_update: default_presence_rule(),
                lazy_request: default_lazy_request_rule(),
                recv: default_recv_rule(),
            },
        }
    }
}

/// Parse a `limit/window_secs` pair like `5/60` from an environment variable
fn rule_from_env(var: &str, fallback: RateLimitRule) -> RateLimitRule {
    env::var(var)
        .ok()
        .and_then(|s| {
            let (limit, window) = s.split_once('/')?;
            Some(RateLimitRule {
                limit: limit.trim().parse().ok()?,
                window_secs: window.trim().parse().ok()?,
            })
        })
        .unwrap_or(fallback)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
