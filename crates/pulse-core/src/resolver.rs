//! Permission resolution
//!
//! Pure computation of a user's effective capability bitmask, layered as:
//! default-role permissions, then the union of the member's roles, then
//! channel overwrites. Consumed by the dispatcher to filter event
//! recipients and by the connection handlers to gate client actions.
//!
//! Resolution never caches: callers recompute on demand against the
//! current records, so a role or overwrite mutation is visible to the
//! next lookup without explicit invalidation.

use crate::permissions::Permissions;
use crate::records::{GuildRecord, MemberRecord, OverwriteRecord, OverwriteTarget, RoleRecord};
use crate::snowflake::Snowflake;

/// Compute a member's base (guild-wide) permissions.
///
/// Starts from the @everyone role, then ORs in each of the member's roles
/// in ascending position order (ties broken by ascending role id). The
/// base stage is purely additive; denies only exist at the overwrite
/// stage. The guild owner and any role carrying ADMINISTRATOR
/// short-circuit to the full bitmask.
pub fn base_permissions(guild: &GuildRecord, member: &MemberRecord) -> Permissions {
    if guild.owner_id == member.user_id {
        return Permissions::ALL;
    }

    let mut permissions = guild
        .everyone_role()
        .map(|r| r.permissions)
        .unwrap_or_default();

    for role in member_roles_ascending(guild, member) {
        permissions |= role.permissions;
    }

    if permissions.contains(Permissions::ADMINISTRATOR) {
        return Permissions::ALL;
    }

    permissions
}

/// Compute a member's effective permissions in a channel.
///
/// Applies channel overwrites on top of [`base_permissions`] in two
/// ordered passes:
///
/// 1. role overwrites, ascending by the role's position (ties by role
///    id), each applied as deny-clear then allow-set, so a higher
///    positioned role's explicit decision wins over a lower one's;
/// 2. the single user-specific overwrite, which always wins last.
///
/// The @everyone overwrite participates in pass 1 at position 0 since the
/// default role shares the guild's id. Owners and administrators bypass
/// overwrites entirely.
pub fn channel_permissions(
    guild: &GuildRecord,
    member: &MemberRecord,
    overwrites: &[OverwriteRecord],
) -> Permissions {
    let base = base_permissions(guild, member);
    if base.contains(Permissions::ADMINISTRATOR) {
        return Permissions::ALL;
    }

    let mut permissions = base;

    // Pass 1: role overwrites, lowest position first.
    let mut held: Vec<&RoleRecord> = member_roles_ascending(guild, member);
    if let Some(everyone) = guild.everyone_role() {
        held.insert(0, everyone);
    }

    for role in held {
        if let Some(ow) = find_role_overwrite(overwrites, role.id) {
            permissions = permissions.apply_overwrite(ow.allow, ow.deny);
        }
    }

    // Pass 2: the user-specific overwrite overrides any role decision.
    if let Some(ow) = find_user_overwrite(overwrites, member.user_id) {
        permissions = permissions.apply_overwrite(ow.allow, ow.deny);
    }

    permissions
}

/// Roles the member holds, sorted ascending by (position, id).
fn member_roles_ascending<'a>(guild: &'a GuildRecord, member: &MemberRecord) -> Vec<&'a RoleRecord> {
    let mut roles: Vec<&RoleRecord> = member
        .role_ids
        .iter()
        .filter_map(|rid| guild.role(*rid))
        .filter(|r| r.id != guild.id)
        .collect();
    roles.sort_by_key(|r| (r.position, r.id));
    roles
}

fn find_role_overwrite(overwrites: &[OverwriteRecord], role_id: Snowflake) -> Option<&OverwriteRecord> {
    overwrites
        .iter()
        .find(|ow| matches!(ow.target, OverwriteTarget::Role(id) if id == role_id))
}

fn find_user_overwrite(overwrites: &[OverwriteRecord], user_id: Snowflake) -> Option<&OverwriteRecord> {
    overwrites
        .iter()
        .find(|ow| matches!(ow.target, OverwriteTarget::User(id) if id == user_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: Snowflake = Snowflake::new(1);
    const USER: Snowflake = Snowflake::new(2);
    const GUILD: Snowflake = Snowflake::new(100);

    fn role(id: i64, position: i32, permissions: Permissions) -> RoleRecord {
        RoleRecord {
            id: Snowflake::new(id),
            name: format!("role-{id}"),
            permissions,
            position,
        }
    }

    fn guild(roles: Vec<RoleRecord>) -> GuildRecord {
        GuildRecord {
            id: GUILD,
            name: "test".to_string(),
            owner_id: OWNER,
            roles,
        }
    }

    fn member(role_ids: &[i64]) -> MemberRecord {
        MemberRecord {
            user_id: USER,
            nickname: None,
            role_ids: role_ids.iter().map(|id| Snowflake::new(*id)).collect(),
        }
    }

    fn role_overwrite(role_id: i64, allow: Permissions, deny: Permissions) -> OverwriteRecord {
        OverwriteRecord {
            target: OverwriteTarget::Role(Snowflake::new(role_id)),
            allow,
            deny,
        }
    }

    fn user_overwrite(user_id: Snowflake, allow: Permissions, deny: Permissions) -> OverwriteRecord {
        OverwriteRecord {
            target: OverwriteTarget::User(user_id),
            allow,
            deny,
        }
    }

    #[test]
    fn test_base_is_everyone_plus_roles() {
        let g = guild(vec![
            role(100, 0, Permissions::VIEW_CHANNEL),
            role(200, 1, Permissions::SEND_MESSAGES),
        ]);
        let perms = base_permissions(&g, &member(&[200]));

        assert!(perms.contains(Permissions::VIEW_CHANNEL));
        assert!(perms.contains(Permissions::SEND_MESSAGES));
        assert!(!perms.contains(Permissions::MANAGE_GUILD));
    }

    #[test]
    fn test_owner_gets_everything() {
        let g = guild(vec![role(100, 0, Permissions::empty())]);
        let owner_member = MemberRecord {
            user_id: OWNER,
            nickname: None,
            role_ids: vec![],
        };
        assert_eq!(base_permissions(&g, &owner_member), Permissions::ALL);
    }

    #[test]
    fn test_administrator_role_short_circuits() {
        let g = guild(vec![
            role(100, 0, Permissions::empty()),
            role(200, 1, Permissions::ADMINISTRATOR),
        ]);
        assert_eq!(base_permissions(&g, &member(&[200])), Permissions::ALL);
    }

    #[test]
    fn test_administrator_ignores_overwrites() {
        let g = guild(vec![
            role(100, 0, Permissions::empty()),
            role(200, 1, Permissions::ADMINISTRATOR),
        ]);
        let ows = vec![role_overwrite(
            100,
            Permissions::empty(),
            Permissions::VIEW_CHANNEL,
        )];
        assert_eq!(
            channel_permissions(&g, &member(&[200]), &ows),
            Permissions::ALL
        );
    }

    #[test]
    fn test_everyone_overwrite_denies() {
        let g = guild(vec![role(100, 0, Permissions::DEFAULT)]);
        let ows = vec![role_overwrite(
            100,
            Permissions::empty(),
            Permissions::SEND_MESSAGES,
        )];
        let perms = channel_permissions(&g, &member(&[]), &ows);
        assert!(!perms.contains(Permissions::SEND_MESSAGES));
        assert!(perms.contains(Permissions::VIEW_CHANNEL));
    }

    #[test]
    fn test_higher_role_overwrite_wins() {
        // lower role denies VIEW_CHANNEL, higher role re-allows it;
        // ascending application means the higher decision lands last
        let g = guild(vec![
            role(100, 0, Permissions::DEFAULT),
            role(200, 1, Permissions::empty()),
            role(300, 2, Permissions::empty()),
        ]);
        let ows = vec![
            role_overwrite(200, Permissions::empty(), Permissions::VIEW_CHANNEL),
            role_overwrite(300, Permissions::VIEW_CHANNEL, Permissions::empty()),
        ];
        let perms = channel_permissions(&g, &member(&[200, 300]), &ows);
        assert!(perms.contains(Permissions::VIEW_CHANNEL));
    }

    #[test]
    fn test_lower_role_deny_holds_without_higher_allow() {
        let g = guild(vec![
            role(100, 0, Permissions::DEFAULT),
            role(200, 1, Permissions::empty()),
        ]);
        let ows = vec![role_overwrite(
            200,
            Permissions::empty(),
            Permissions::VIEW_CHANNEL,
        )];
        let perms = channel_permissions(&g, &member(&[200]), &ows);
        assert!(!perms.contains(Permissions::VIEW_CHANNEL));
    }

    #[test]
    fn test_user_overwrite_always_wins() {
        // every role allows VIEW_CHANNEL; the user overwrite denies it
        let g = guild(vec![
            role(100, 0, Permissions::DEFAULT),
            role(300, 9, Permissions::VIEW_CHANNEL),
        ]);
        let ows = vec![
            role_overwrite(300, Permissions::VIEW_CHANNEL, Permissions::empty()),
            user_overwrite(USER, Permissions::empty(), Permissions::VIEW_CHANNEL),
        ];
        let perms = channel_permissions(&g, &member(&[300]), &ows);
        assert!(!perms.contains(Permissions::VIEW_CHANNEL));
    }

    #[test]
    fn test_user_overwrite_allow_beats_role_deny() {
        let g = guild(vec![
            role(100, 0, Permissions::DEFAULT),
            role(200, 1, Permissions::empty()),
        ]);
        let ows = vec![
            role_overwrite(200, Permissions::empty(), Permissions::SEND_MESSAGES),
            user_overwrite(USER, Permissions::SEND_MESSAGES, Permissions::empty()),
        ];
        let perms = channel_permissions(&g, &member(&[200]), &ows);
        assert!(perms.contains(Permissions::SEND_MESSAGES));
    }

    #[test]
    fn test_position_ties_break_by_role_id() {
        // same position: the higher role id applies later and wins
        let g = guild(vec![
            role(100, 0, Permissions::DEFAULT),
            role(200, 3, Permissions::empty()),
            role(201, 3, Permissions::empty()),
        ]);
        let ows = vec![
            role_overwrite(200, Permissions::empty(), Permissions::ATTACH_FILES),
            role_overwrite(201, Permissions::ATTACH_FILES, Permissions::empty()),
        ];
        let perms = channel_permissions(&g, &member(&[200, 201]), &ows);
        assert!(perms.contains(Permissions::ATTACH_FILES));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let g = guild(vec![
            role(100, 0, Permissions::DEFAULT),
            role(200, 1, Permissions::MANAGE_MESSAGES),
            role(300, 2, Permissions::KICK_MEMBERS),
        ]);
        let m = member(&[300, 200]);
        let ows = vec![
            role_overwrite(200, Permissions::MENTION_EVERYONE, Permissions::empty()),
            user_overwrite(USER, Permissions::empty(), Permissions::ATTACH_FILES),
        ];

        let first = channel_permissions(&g, &m, &ows);
        let second = channel_permissions(&g, &m, &ows);
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_role_ids_are_skipped() {
        let g = guild(vec![role(100, 0, Permissions::DEFAULT)]);
        let perms = base_permissions(&g, &member(&[999]));
        assert_eq!(perms, Permissions::DEFAULT);
    }
}
