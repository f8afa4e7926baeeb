//! Storage view
//!
//! The gateway's read model: guilds, channels, members, users, and
//! relationships, kept in memory and updated by the surrounding
//! application. Dispatch and permission checks read from here so the
//! hot path never blocks on I/O.

use dashmap::DashMap;
use pulse_core::{
    channel_permissions, ChannelRecord, DomainError, GuildRecord, MemberRecord, Permissions,
    RelationshipRecord, Snowflake, UserRecord,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Concurrent read model for dispatch and permission resolution
pub struct StorageView {
    guilds: DashMap<Snowflake, GuildRecord>,
    channels: DashMap<Snowflake, ChannelRecord>,
    /// Keyed by (guild_id, user_id)
    members: DashMap<(Snowflake, Snowflake), MemberRecord>,
    /// User to the guilds they belong to
    user_guilds: DashMap<Snowflake, HashSet<Snowflake>>,
    /// Accepted relationships, stored symmetrically
    friends: DashMap<Snowflake, HashSet<Snowflake>>,
    users: DashMap<Snowflake, UserRecord>,
}

impl StorageView {
    #[must_use]
    pub fn new() -> Self {
        Self {
            guilds: DashMap::new(),
            channels: DashMap::new(),
            members: DashMap::new(),
            user_guilds: DashMap::new(),
            friends: DashMap::new(),
            users: DashMap::new(),
        }
    }

    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    // === Writes (driven by the surrounding application) ===

    pub fn upsert_user(&self, user: UserRecord) {
        self.users.insert(user.id, user);
    }

    pub fn upsert_guild(&self, guild: GuildRecord) {
        self.guilds.insert(guild.id, guild);
    }

    pub fn remove_guild(&self, guild_id: Snowflake) {
        self.guilds.remove(&guild_id);
        self.channels.retain(|_, c| c.guild_id != guild_id);
        self.members.retain(|(gid, _), _| *gid != guild_id);
        for mut entry in self.user_guilds.iter_mut() {
            entry.remove(&guild_id);
        }
        self.user_guilds.retain(|_, guilds| !guilds.is_empty());
    }

    pub fn upsert_channel(&self, channel: ChannelRecord) {
        self.channels.insert(channel.id, channel);
    }

    pub fn remove_channel(&self, channel_id: Snowflake) {
        self.channels.remove(&channel_id);
    }

    pub fn upsert_member(&self, guild_id: Snowflake, member: MemberRecord) {
        self.user_guilds
            .entry(member.user_id)
            .or_default()
            .insert(guild_id);
        self.members.insert((guild_id, member.user_id), member);
    }

    pub fn remove_member(&self, guild_id: Snowflake, user_id: Snowflake) {
        self.members.remove(&(guild_id, user_id));
        self.user_guilds.alter(&user_id, |_, mut guilds| {
            guilds.remove(&guild_id);
            guilds
        });
        self.user_guilds.retain(|_, guilds| !guilds.is_empty());
    }

    /// Record an accepted relationship (both directions)
    pub fn add_friendship(&self, a: Snowflake, b: Snowflake) {
        self.friends.entry(a).or_default().insert(b);
        self.friends.entry(b).or_default().insert(a);
    }

    pub fn upsert_relationship(&self, rel: RelationshipRecord) {
        self.add_friendship(rel.user_id, rel.peer_id);
    }

    pub fn remove_friendship(&self, a: Snowflake, b: Snowflake) {
        self.friends.alter(&a, |_, mut set| {
            set.remove(&b);
            set
        });
        self.friends.alter(&b, |_, mut set| {
            set.remove(&a);
            set
        });
        self.friends.retain(|_, set| !set.is_empty());
    }

    // === Reads ===

    pub fn user(&self, user_id: Snowflake) -> Option<UserRecord> {
        self.users.get(&user_id).map(|r| r.clone())
    }

    pub fn guild(&self, guild_id: Snowflake) -> Option<GuildRecord> {
        self.guilds.get(&guild_id).map(|r| r.clone())
    }

    pub fn channel(&self, channel_id: Snowflake) -> Option<ChannelRecord> {
        self.channels.get(&channel_id).map(|r| r.clone())
    }

    pub fn member(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<MemberRecord> {
        self.members.get(&(guild_id, user_id)).map(|r| r.clone())
    }

    pub fn is_member(&self, guild_id: Snowflake, user_id: Snowflake) -> bool {
        self.members.contains_key(&(guild_id, user_id))
    }

    /// Guilds the user belongs to, unordered
    pub fn guilds_for_user(&self, user_id: Snowflake) -> Vec<Snowflake> {
        self.user_guilds
            .get(&user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Users with an accepted relationship to this user
    pub fn friends_of(&self, user_id: Snowflake) -> Vec<Snowflake> {
        self.friends
            .get(&user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn member_count(&self, guild_id: Snowflake) -> usize {
        self.members
            .iter()
            .filter(|entry| entry.key().0 == guild_id)
            .count()
    }

    // === Permission resolution ===

    /// Effective permissions of a user in a channel
    ///
    /// # Errors
    /// Returns an error if the channel or its guild is unknown, or the
    /// user is not a member of the guild.
    pub fn channel_permissions(
        &self,
        channel_id: Snowflake,
        user_id: Snowflake,
    ) -> Result<Permissions, DomainError> {
        let channel = self
            .channels
            .get(&channel_id)
            .ok_or(DomainError::UnknownChannel(channel_id))?;
        let guild = self
            .guilds
            .get(&channel.guild_id)
            .ok_or(DomainError::UnknownGuild(channel.guild_id))?;
        let member = self
            .members
            .get(&(channel.guild_id, user_id))
            .ok_or(DomainError::NotAMember {
                guild_id: channel.guild_id,
                user_id,
            })?;

        Ok(channel_permissions(&guild, &member, &channel.overwrites))
    }

    /// Whether the user can currently see the channel. Unknown channels
    /// and non-members read as "no".
    pub fn can_view_channel(&self, channel_id: Snowflake, user_id: Snowflake) -> bool {
        self.channel_permissions(channel_id, user_id)
            .map(|perms| perms.has(Permissions::VIEW_CHANNEL))
            .unwrap_or(false)
    }
}

impl Default for StorageView {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StorageView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageView")
            .field("guilds", &self.guilds.len())
            .field("channels", &self.channels.len())
            .field("members", &self.members.len())
            .field("users", &self.users.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::{OverwriteRecord, OverwriteTarget, RoleRecord};

    const GUILD: Snowflake = Snowflake::new(100);
    const CHANNEL: Snowflake = Snowflake::new(200);
    const OWNER: Snowflake = Snowflake::new(1);
    const USER: Snowflake = Snowflake::new(2);

    fn seeded_view() -> StorageView {
        let view = StorageView::new();
        view.upsert_guild(GuildRecord {
            id: GUILD,
            name: "test".to_string(),
            owner_id: OWNER,
            roles: vec![RoleRecord {
                id: GUILD,
                name: "@everyone".to_string(),
                permissions: Permissions::DEFAULT,
                position: 0,
            }],
        });
        view.upsert_channel(ChannelRecord {
            id: CHANNEL,
            guild_id: GUILD,
            name: "general".to_string(),
            position: 0,
            overwrites: vec![],
        });
        view.upsert_member(
            GUILD,
            MemberRecord {
                user_id: USER,
                nickname: None,
                role_ids: vec![],
            },
        );
        view
    }

    #[test]
    fn test_membership_indexing() {
        let view = seeded_view();
        assert!(view.is_member(GUILD, USER));
        assert_eq!(view.guilds_for_user(USER), vec![GUILD]);
        assert_eq!(view.member_count(GUILD), 1);

        view.remove_member(GUILD, USER);
        assert!(!view.is_member(GUILD, USER));
        assert!(view.guilds_for_user(USER).is_empty());
    }

    #[test]
    fn test_friendship_is_symmetric() {
        let view = StorageView::new();
        view.add_friendship(Snowflake::new(1), Snowflake::new(2));

        assert_eq!(view.friends_of(Snowflake::new(1)), vec![Snowflake::new(2)]);
        assert_eq!(view.friends_of(Snowflake::new(2)), vec![Snowflake::new(1)]);

        view.remove_friendship(Snowflake::new(2), Snowflake::new(1));
        assert!(view.friends_of(Snowflake::new(1)).is_empty());
        assert!(view.friends_of(Snowflake::new(2)).is_empty());
    }

    #[test]
    fn test_channel_permissions_for_member() {
        let view = seeded_view();
        let perms = view.channel_permissions(CHANNEL, USER).unwrap();
        assert!(perms.has(Permissions::VIEW_CHANNEL));
        assert!(view.can_view_channel(CHANNEL, USER));
    }

    #[test]
    fn test_channel_permissions_denied_by_overwrite() {
        let view = seeded_view();
        view.upsert_channel(ChannelRecord {
            id: CHANNEL,
            guild_id: GUILD,
            name: "general".to_string(),
            position: 0,
            overwrites: vec![OverwriteRecord {
                target: OverwriteTarget::Role(GUILD),
                allow: Permissions::empty(),
                deny: Permissions::VIEW_CHANNEL,
            }],
        });

        assert!(!view.can_view_channel(CHANNEL, USER));
    }

    #[test]
    fn test_channel_permissions_unknown_entities() {
        let view = seeded_view();

        assert!(matches!(
            view.channel_permissions(Snowflake::new(999), USER),
            Err(DomainError::UnknownChannel(_))
        ));
        assert!(matches!(
            view.channel_permissions(CHANNEL, Snowflake::new(999)),
            Err(DomainError::NotAMember { .. })
        ));
        assert!(!view.can_view_channel(CHANNEL, Snowflake::new(999)));
    }

    #[test]
    fn test_remove_guild_clears_dependents() {
        let view = seeded_view();
        view.remove_guild(GUILD);

        assert!(view.guild(GUILD).is_none());
        assert!(view.channel(CHANNEL).is_none());
        assert!(!view.is_member(GUILD, USER));
        assert!(view.guilds_for_user(USER).is_empty());
    }
}
