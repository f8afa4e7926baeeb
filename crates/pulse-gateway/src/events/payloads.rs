//! Event payload definitions
//!
//! Data structures for the dispatch payloads the gateway constructs
//! itself. Domain events (messages, channel edits) arrive pre-serialized
//! from the caller and pass through the dispatcher untouched.

use pulse_core::{Snowflake, UserRecord};
use serde::{Deserialize, Serialize};

// === Connection Events ===

/// READY event payload
///
/// Sent after successful Identify, always with sequence number 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyEvent {
    /// Gateway protocol version
    pub v: i32,

    /// Current user
    pub user: UserRecord,

    /// Ids of guilds this session will receive events for; each is
    /// followed by its own GUILD_CREATE dispatch
    pub guild_ids: Vec<Snowflake>,

    /// Session ID for resuming
    pub session_id: String,
}

impl ReadyEvent {
    /// Current gateway protocol version
    pub const VERSION: i32 = 1;
}

/// RESUMED event payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumedEvent {}

/// RATE_LIMITED event payload
///
/// Sent instead of closing the connection when a recoverable action
/// (presence update, lazy request) exceeds its budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitedEvent {
    pub message: String,
    /// Seconds until the action may be retried
    pub retry_after: f64,
    pub global: bool,
}

impl RateLimitedEvent {
    #[must_use]
    pub fn new(retry_after: f64) -> Self {
        Self {
            message: "You are being rate limited.".to_string(),
            retry_after,
            global: false,
        }
    }
}

// === Guild Events ===

/// GUILD_CREATE payload sent for each guild after READY
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildPayload {
    pub id: Snowflake,
    pub name: String,
    pub owner_id: Snowflake,
    pub member_count: usize,
}

// === Presence Events ===

/// PRESENCE_UPDATE event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub user_id: Snowflake,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<Snowflake>,
    pub status: String,
}

// === Member List Events ===

/// GUILD_MEMBER_LIST_UPDATE event payload
///
/// Only delivered to sessions that opted in via a Lazy Request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberListUpdateEvent {
    pub guild_id: Snowflake,
    pub member_count: usize,
}
