//! # pulse-core
//!
//! Domain value objects shared across the pulse gateway: snowflake ids,
//! permission bitflags, the plain records supplied by the storage layer,
//! and the pure permission-resolution algorithm.

pub mod error;
pub mod permissions;
pub mod records;
pub mod resolver;
pub mod snowflake;

pub use error::DomainError;
pub use permissions::Permissions;
pub use records::{
    ChannelRecord, GuildRecord, MemberRecord, OverwriteRecord, OverwriteTarget,
    RelationshipRecord, RoleRecord, UserRecord,
};
pub use resolver::{base_permissions, channel_permissions};
pub use snowflake::Snowflake;
