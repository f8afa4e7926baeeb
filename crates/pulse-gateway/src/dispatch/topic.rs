//! Dispatch topics
//!
//! A topic is the routing target of a dispatch: a (kind, key) pair that
//! sessions subscribe to. The kind set is closed; each variant has a
//! dedicated delivery path in the dispatcher, so adding a kind is a
//! compile-time exhaustiveness change rather than a runtime lookup.

use pulse_core::Snowflake;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A routing target for event dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum Topic {
    /// All sessions of the guild's members
    Guild(Snowflake),
    /// Guild members who can currently view the channel
    Channel(Snowflake),
    /// All sessions of one user
    User(Snowflake),
    /// Sessions of users who have an accepted relationship with this user
    Friend(Snowflake),
    /// Sessions that opted into incremental member-list updates for a guild
    LazyMemberList(Snowflake),
}

impl Topic {
    /// The topic's key: the entity id it routes around
    #[must_use]
    pub const fn key(self) -> Snowflake {
        match self {
            Self::Guild(id)
            | Self::Channel(id)
            | Self::User(id)
            | Self::Friend(id)
            | Self::LazyMemberList(id) => id,
        }
    }

    /// The kind name, for logging
    #[must_use]
    pub const fn kind(self) -> &'static str {
        match self {
            Self::Guild(_) => "guild",
            Self::Channel(_) => "channel",
            Self::User(_) => "user",
            Self::Friend(_) => "friend",
            Self::LazyMemberList(_) => "lazy_member_list",
        }
    }

    /// The guild this topic is scoped to, if it is guild-scoped.
    ///
    /// Guild-scoped topics participate in shard routing; user-scoped
    /// topics (user, friend) are delivered to every shard.
    #[must_use]
    pub const fn guild_scope(self) -> Option<Snowflake> {
        match self {
            Self::Guild(id) | Self::LazyMemberList(id) => Some(id),
            // Channel topics resolve their guild through storage.
            Self::Channel(_) | Self::User(_) | Self::Friend(_) => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_key_and_kind() {
        let topic = Topic::Guild(Snowflake::new(42));
        assert_eq!(topic.key(), Snowflake::new(42));
        assert_eq!(topic.kind(), "guild");
    }

    #[test]
    fn test_topic_display() {
        assert_eq!(Topic::Channel(Snowflake::new(7)).to_string(), "channel:7");
        assert_eq!(
            Topic::LazyMemberList(Snowflake::new(9)).to_string(),
            "lazy_member_list:9"
        );
    }

    #[test]
    fn test_guild_scope() {
        assert_eq!(
            Topic::Guild(Snowflake::new(1)).guild_scope(),
            Some(Snowflake::new(1))
        );
        assert_eq!(
            Topic::LazyMemberList(Snowflake::new(2)).guild_scope(),
            Some(Snowflake::new(2))
        );
        assert_eq!(Topic::User(Snowflake::new(3)).guild_scope(), None);
        assert_eq!(Topic::Channel(Snowflake::new(4)).guild_scope(), None);
    }

    #[test]
    fn test_topics_are_distinct_across_kinds() {
        let id = Snowflake::new(5);
        assert_ne!(Topic::Guild(id), Topic::Channel(id));
        assert_ne!(Topic::User(id), Topic::Friend(id));
    }

    #[test]
    fn test_topic_serialization() {
        let topic = Topic::Friend(Snowflake::new(11));
        let json = serde_json::to_string(&topic).unwrap();
        assert!(json.contains("friend"));

        let parsed: Topic = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, topic);
    }
}
