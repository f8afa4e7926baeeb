//! Permission bitflags for guild access control
//!
//! A 64-bit bitfield; the absence of a bit always means "not permitted".

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

bitflags! {
    /// Capability bits for a user within a guild or channel
    ///
    /// Serialized as a decimal string in JSON for JavaScript safety.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u64 {
        /// Create guild invites
        const CREATE_INVITES    = 1 << 0;
        /// Kick members from guild
        const KICK_MEMBERS      = 1 << 1;
        /// Ban members from guild
        const BAN_MEMBERS       = 1 << 2;
        /// Bypass all permission checks
        const ADMINISTRATOR     = 1 << 3;
        /// Create, edit, delete channels
        const MANAGE_CHANNELS   = 1 << 4;
        /// Edit guild settings
        const MANAGE_GUILD      = 1 << 5;
        /// Add emoji reactions
        const ADD_REACTIONS     = 1 << 6;
        /// View channel and read messages
        const VIEW_CHANNEL      = 1 << 10;
        /// Send messages in text channels
        const SEND_MESSAGES     = 1 << 11;
        /// Delete other users' messages
        const MANAGE_MESSAGES   = 1 << 13;
        /// Upload files and images
        const ATTACH_FILES      = 1 << 15;
        /// Read message history
        const READ_HISTORY      = 1 << 16;
        /// Mention @everyone and roles
        const MENTION_EVERYONE  = 1 << 17;
        /// Create, edit, delete, assign roles
        const MANAGE_ROLES      = 1 << 28;

        /// Default permissions for the @everyone role of a fresh guild
        const DEFAULT = Self::CREATE_INVITES.bits()
            | Self::VIEW_CHANNEL.bits()
            | Self::SEND_MESSAGES.bits()
            | Self::ADD_REACTIONS.bits()
            | Self::ATTACH_FILES.bits()
            | Self::READ_HISTORY.bits();

        /// All permissions (guild owners and administrators)
        const ALL = Self::CREATE_INVITES.bits()
            | Self::KICK_MEMBERS.bits()
            | Self::BAN_MEMBERS.bits()
            | Self::ADMINISTRATOR.bits()
            | Self::MANAGE_CHANNELS.bits()
            | Self::MANAGE_GUILD.bits()
            | Self::ADD_REACTIONS.bits()
            | Self::VIEW_CHANNEL.bits()
            | Self::SEND_MESSAGES.bits()
            | Self::MANAGE_MESSAGES.bits()
            | Self::ATTACH_FILES.bits()
            | Self::READ_HISTORY.bits()
            | Self::MENTION_EVERYONE.bits()
            | Self::MANAGE_ROLES.bits();
    }
}

impl Permissions {
    /// Check if the permission set contains a required permission
    ///
    /// Administrators bypass all permission checks.
    #[inline]
    pub fn has(&self, permission: Permissions) -> bool {
        if self.contains(Permissions::ADMINISTRATOR) {
            return true;
        }
        self.contains(permission)
    }

    /// Check if the permission set has any of the given permissions
    #[inline]
    pub fn has_any(&self, permissions: Permissions) -> bool {
        if self.contains(Permissions::ADMINISTRATOR) {
            return true;
        }
        self.intersects(permissions)
    }

    /// Combine permissions from multiple roles
    pub fn combine<I>(roles: I) -> Self
    where
        I: IntoIterator<Item = Permissions>,
    {
        roles
            .into_iter()
            .fold(Permissions::empty(), |acc, p| acc | p)
    }

    /// Apply a single channel overwrite: denied bits cleared first,
    /// allowed bits set after, so an overwrite's allow beats its own deny.
    #[inline]
    pub fn apply_overwrite(self, allow: Permissions, deny: Permissions) -> Self {
        (self & !deny) | allow
    }

    /// Get the raw bits as i64 (storage representation)
    #[inline]
    pub fn to_i64(self) -> i64 {
        self.bits() as i64
    }

    /// Create from raw i64 bits (storage representation)
    #[inline]
    pub fn from_i64(bits: i64) -> Self {
        Permissions::from_bits_truncate(bits as u64)
    }

    /// Parse from string representation (decimal number)
    pub fn parse(s: &str) -> Result<Self, std::num::ParseIntError> {
        s.parse::<u64>().map(Permissions::from_bits_truncate)
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Permissions::empty()
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

// Serialize as string for JSON (JavaScript BigInt safety)
impl Serialize for Permissions {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.bits().to_string())
    }
}

// Deserialize from string or number
impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct PermissionsVisitor;

        impl Visitor<'_> for PermissionsVisitor {
            type Value = Permissions;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or integer representing permission bits")
            }

            fn visit_i64<E>(self, value: i64) -> Result<Permissions, E>
            where
                E: de::Error,
            {
                Ok(Permissions::from_bits_truncate(value as u64))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Permissions, E>
            where
                E: de::Error,
            {
                Ok(Permissions::from_bits_truncate(value))
            }

            fn visit_str<E>(self, value: &str) -> Result<Permissions, E>
            where
                E: de::Error,
            {
                value
                    .parse::<u64>()
                    .map(Permissions::from_bits_truncate)
                    .map_err(|_| de::Error::custom("invalid permissions string"))
            }
        }

        deserializer.deserialize_any(PermissionsVisitor)
    }
}

impl From<i64> for Permissions {
    fn from(bits: i64) -> Self {
        Permissions::from_bits_truncate(bits as u64)
    }
}

impl From<u64> for Permissions {
    fn from(bits: u64) -> Self {
        Permissions::from_bits_truncate(bits)
    }
}

impl From<Permissions> for u64 {
    fn from(perms: Permissions) -> Self {
        perms.bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_permissions() {
        let default = Permissions::DEFAULT;
        assert!(default.contains(Permissions::VIEW_CHANNEL));
        assert!(default.contains(Permissions::SEND_MESSAGES));
        assert!(default.contains(Permissions::READ_HISTORY));
        assert!(!default.contains(Permissions::ADMINISTRATOR));
        assert!(!default.contains(Permissions::MANAGE_GUILD));
    }

    #[test]
    fn test_administrator_bypass() {
        let admin = Permissions::ADMINISTRATOR;
        assert!(admin.has(Permissions::VIEW_CHANNEL));
        assert!(admin.has(Permissions::MANAGE_GUILD));
        assert!(admin.has(Permissions::BAN_MEMBERS));
    }

    #[test]
    fn test_has_permission() {
        let perms = Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES;
        assert!(perms.has(Permissions::VIEW_CHANNEL));
        assert!(perms.has(Permissions::SEND_MESSAGES));
        assert!(!perms.has(Permissions::MANAGE_GUILD));
    }

    #[test]
    fn test_has_any() {
        let perms = Permissions::VIEW_CHANNEL;
        let check = Permissions::VIEW_CHANNEL | Permissions::MANAGE_GUILD;
        assert!(perms.has_any(check));

        let perms2 = Permissions::SEND_MESSAGES;
        assert!(!perms2.has_any(check));
    }

    #[test]
    fn test_combine_permissions() {
        let combined = Permissions::combine([
            Permissions::VIEW_CHANNEL,
            Permissions::SEND_MESSAGES,
            Permissions::MANAGE_GUILD,
        ]);
        assert!(combined.contains(Permissions::VIEW_CHANNEL));
        assert!(combined.contains(Permissions::SEND_MESSAGES));
        assert!(combined.contains(Permissions::MANAGE_GUILD));
    }

    #[test]
    fn test_apply_overwrite_allow_beats_own_deny() {
        let base = Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES;
        let mixed = base.apply_overwrite(Permissions::SEND_MESSAGES, Permissions::SEND_MESSAGES);
        assert!(mixed.contains(Permissions::SEND_MESSAGES));
    }

    #[test]
    fn test_apply_overwrite_deny() {
        let base = Permissions::DEFAULT;
        let mixed = base.apply_overwrite(Permissions::empty(), Permissions::SEND_MESSAGES);
        assert!(!mixed.contains(Permissions::SEND_MESSAGES));
        assert!(mixed.contains(Permissions::VIEW_CHANNEL));
    }

    #[test]
    fn test_serialize_json() {
        let perms = Permissions::CREATE_INVITES | Permissions::KICK_MEMBERS;
        let json = serde_json::to_string(&perms).unwrap();
        assert_eq!(json, "\"3\""); // 1 + 2 = 3
    }

    #[test]
    fn test_deserialize_string() {
        let perms: Permissions = serde_json::from_str("\"3\"").unwrap();
        assert!(perms.contains(Permissions::CREATE_INVITES));
        assert!(perms.contains(Permissions::KICK_MEMBERS));
    }

    #[test]
    fn test_deserialize_number() {
        let perms: Permissions = serde_json::from_str("3").unwrap();
        assert!(perms.contains(Permissions::CREATE_INVITES));
        assert!(perms.contains(Permissions::KICK_MEMBERS));
    }

    #[test]
    fn test_to_from_i64() {
        let perms = Permissions::DEFAULT;
        let bits = perms.to_i64();
        let restored = Permissions::from_i64(bits);
        assert_eq!(perms, restored);
    }

    #[test]
    fn test_parse() {
        let perms = Permissions::parse("3").unwrap();
        assert!(perms.contains(Permissions::CREATE_INVITES));
        assert!(perms.contains(Permissions::KICK_MEMBERS));
    }

    #[test]
    fn test_all_excludes_undefined_bits() {
        // ALL must only carry defined bits, never u64::MAX
        assert_eq!(
            Permissions::ALL.bits(),
            Permissions::all().bits(),
            "ALL should equal the union of defined flags"
        );
    }
}
