//! Client payload definitions
//!
//! Payload structures carried in the `d` field of client-to-server
//! messages, plus the HELLO payload the server sends on connect.

use pulse_core::Snowflake;
use serde::{Deserialize, Serialize};

/// Payload for op 10 (Hello)
///
/// Sent by the server immediately after connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

impl HelloPayload {
    /// Create a Hello payload advertising the given interval
    #[must_use]
    pub fn with_interval(heartbeat_interval: u64) -> Self {
        Self { heartbeat_interval }
    }
}

/// Payload for op 2 (Identify)
///
/// Sent by the client to authenticate the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Authentication token
    pub token: String,

    /// Optional `[shard_id, shard_count]` pair; omitted means unsharded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u32; 2]>,

    /// Optional client properties
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<IdentifyProperties>,
}

impl IdentifyPayload {
    /// The shard pair, defaulting to `[0, 1]` when the client omits it
    #[must_use]
    pub fn shard_pair(&self) -> (u32, u32) {
        match self.shard {
            Some([id, count]) => (id, count),
            None => (0, 1),
        }
    }
}

/// Client connection properties
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentifyProperties {
    /// Operating system
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,

    /// Browser or client name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,

    /// Device type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// Payload for op 3 (Presence Update)
///
/// Sent by the client to update their online status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceUpdatePayload {
    /// New status (online, idle, dnd, offline)
    pub status: String,
}

impl PresenceUpdatePayload {
    /// Valid status values
    pub const VALID_STATUSES: &'static [&'static str] = &["online", "idle", "dnd", "offline"];

    /// Check if the status is valid
    #[must_use]
    pub fn is_valid_status(&self) -> bool {
        Self::VALID_STATUSES.contains(&self.status.as_str())
    }
}

/// Payload for op 4 (Resume)
///
/// Sent by the client to resume a disconnected session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    /// Authentication token
    pub token: String,

    /// Session ID to resume
    pub session_id: String,

    /// Last received sequence number
    pub seq: u64,
}

/// Payload for op 14 (Lazy Request)
///
/// Opts the session in or out of incremental member-list updates for a
/// guild. Sessions that never send this get no member-list traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LazyRequestPayload {
    pub guild_id: Snowflake,
    #[serde(default = "default_subscribe")]
    pub subscribe: bool,
}

fn default_subscribe() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_payload() {
        let hello = HelloPayload::with_interval(41_250);
        assert_eq!(hello.heartbeat_interval, 41_250);
    }

    #[test]
    fn test_identify_shard_defaults() {
        let payload = IdentifyPayload {
            token: "t".to_string(),
            shard: None,
            properties: None,
        };
        assert_eq!(payload.shard_pair(), (0, 1));

        let sharded = IdentifyPayload {
            token: "t".to_string(),
            shard: Some([2, 4]),
            properties: None,
        };
        assert_eq!(sharded.shard_pair(), (2, 4));
    }

    #[test]
    fn test_presence_update_validation() {
        let valid = PresenceUpdatePayload {
            status: "online".to_string(),
        };
        assert!(valid.is_valid_status());

        let invalid = PresenceUpdatePayload {
            status: "busy".to_string(),
        };
        assert!(!invalid.is_valid_status());
    }

    #[test]
    fn test_resume_payload_serialization() {
        let payload = ResumePayload {
            token: "token123".to_string(),
            session_id: "session456".to_string(),
            seq: 42,
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("session456"));
        assert!(json.contains("42"));
    }

    #[test]
    fn test_lazy_request_subscribe_defaults_to_true() {
        let payload: LazyRequestPayload =
            serde_json::from_str(r#"{"guild_id": "123"}"#).unwrap();
        assert_eq!(payload.guild_id, Snowflake::new(123));
        assert!(payload.subscribe);

        let off: LazyRequestPayload =
            serde_json::from_str(r#"{"guild_id": "123", "subscribe": false}"#).unwrap();
        assert!(!off.subscribe);
    }
}
