//! Handler error types

use crate::protocol::CloseCode;
use pulse_core::DomainError;
use thiserror::Error;

/// Handler error type
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Invalid payload received
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Not authenticated
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Already authenticated
    #[error("Already authenticated")]
    AlreadyAuthenticated,

    /// Invalid shard configuration
    #[error("Invalid shard: {0}")]
    InvalidShard(String),

    /// Domain error (from the storage view)
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Convert to a close code (if applicable)
    #[must_use]
    pub fn to_close_code(&self) -> Option<CloseCode> {
        match self {
            Self::InvalidPayload(_) => Some(CloseCode::DecodeError),
            Self::AuthenticationFailed(_) => Some(CloseCode::AuthenticationFailed),
            Self::NotAuthenticated => Some(CloseCode::NotAuthenticated),
            Self::AlreadyAuthenticated => Some(CloseCode::AlreadyAuthenticated),
            Self::InvalidShard(_) => Some(CloseCode::InvalidShard),
            Self::Domain(_) | Self::Internal(_) => Some(CloseCode::UnknownError),
        }
    }
}

/// Handler result type
pub type HandlerResult<T> = Result<T, HandlerError>;
