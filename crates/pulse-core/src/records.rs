//! Storage-layer records
//!
//! Plain structured records handed to the gateway core by the storage
//! layer: guilds with their role lists, channels with their overwrite
//! lists, member snapshots, and accepted relationships. The gateway never
//! reads these from disk itself; they are populated in advance so the
//! dispatch hot path stays free of blocking I/O.

use crate::permissions::Permissions;
use crate::snowflake::Snowflake;
use serde::{Deserialize, Serialize};

/// A guild role with its position in the role hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: Snowflake,
    pub name: String,
    pub permissions: Permissions,
    /// Hierarchy position; higher wins on explicit allow/deny conflicts.
    /// The @everyone role sits at position 0.
    pub position: i32,
}

/// A guild as seen by the gateway
///
/// The @everyone role shares the guild's id, following the usual
/// chat-platform convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildRecord {
    pub id: Snowflake,
    pub name: String,
    pub owner_id: Snowflake,
    pub roles: Vec<RoleRecord>,
}

impl GuildRecord {
    /// The guild's default (@everyone) role, if the storage layer
    /// supplied one.
    pub fn everyone_role(&self) -> Option<&RoleRecord> {
        self.roles.iter().find(|r| r.id == self.id)
    }

    /// Look up a role by id
    pub fn role(&self, role_id: Snowflake) -> Option<&RoleRecord> {
        self.roles.iter().find(|r| r.id == role_id)
    }
}

/// Target of a channel permission overwrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum OverwriteTarget {
    Role(Snowflake),
    User(Snowflake),
}

/// A channel-level permission overwrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverwriteRecord {
    pub target: OverwriteTarget,
    pub allow: Permissions,
    pub deny: Permissions,
}

/// A guild channel with its overwrite list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: Snowflake,
    pub guild_id: Snowflake,
    pub name: String,
    pub position: i32,
    pub overwrites: Vec<OverwriteRecord>,
}

/// A guild member snapshot: which roles the user currently holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub user_id: Snowflake,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    pub role_ids: Vec<Snowflake>,
}

/// An accepted relationship between two users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub user_id: Snowflake,
    pub peer_id: Snowflake,
}

/// A user as seen by the gateway (enough for READY payloads)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Snowflake,
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guild_with_roles() -> GuildRecord {
        GuildRecord {
            id: Snowflake::new(100),
            name: "test".to_string(),
            owner_id: Snowflake::new(1),
            roles: vec![
                RoleRecord {
                    id: Snowflake::new(100),
                    name: "@everyone".to_string(),
                    permissions: Permissions::DEFAULT,
                    position: 0,
                },
                RoleRecord {
                    id: Snowflake::new(200),
                    name: "mods".to_string(),
                    permissions: Permissions::MANAGE_MESSAGES,
                    position: 5,
                },
            ],
        }
    }

    #[test]
    fn test_everyone_role_shares_guild_id() {
        let guild = guild_with_roles();
        let everyone = guild.everyone_role().unwrap();
        assert_eq!(everyone.id, guild.id);
        assert_eq!(everyone.position, 0);
    }

    #[test]
    fn test_role_lookup() {
        let guild = guild_with_roles();
        assert!(guild.role(Snowflake::new(200)).is_some());
        assert!(guild.role(Snowflake::new(999)).is_none());
    }

    #[test]
    fn test_overwrite_target_serialization() {
        let target = OverwriteTarget::Role(Snowflake::new(42));
        let json = serde_json::to_string(&target).unwrap();
        assert!(json.contains("role"));
        assert!(json.contains("42"));

        let parsed: OverwriteTarget = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, target);
    }
}
