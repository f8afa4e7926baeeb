//! Domain errors shared across the gateway crates

use crate::snowflake::Snowflake;
use thiserror::Error;

/// Errors raised when a record the gateway needs does not exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("unknown guild: {0}")]
    UnknownGuild(Snowflake),

    #[error("unknown channel: {0}")]
    UnknownChannel(Snowflake),

    #[error("unknown user: {0}")]
    UnknownUser(Snowflake),

    #[error("user {user_id} is not a member of guild {guild_id}")]
    NotAMember {
        guild_id: Snowflake,
        user_id: Snowflake,
    },
}
