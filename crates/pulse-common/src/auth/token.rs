//! JWT validation for gateway authentication
//!
//! The gateway only validates tokens presented at IDENTIFY; it never
//! issues them to clients. `issue_token` exists for tests and tooling.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use pulse_core::Snowflake;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Get the user ID as a Snowflake
    ///
    /// # Errors
    /// Returns an error if the subject cannot be parsed as a Snowflake
    pub fn user_id(&self) -> Result<Snowflake, AppError> {
        self.sub
            .parse::<i64>()
            .map(Snowflake::new)
            .map_err(|_| AppError::InvalidToken)
    }
}

/// Validates (and, for tests, issues) gateway authentication tokens
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiry_secs: i64,
}

impl TokenService {
    /// Create a new token service with the given secret and expiry
    #[must_use]
    pub fn new(secret: &str, token_expiry_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_expiry_secs,
        }
    }

    /// Validate a token and return the authenticated user id
    ///
    /// # Errors
    /// Returns an error if the token is malformed, forged, or expired
    pub fn authenticate(&self, token: &str) -> Result<Snowflake, AppError> {
        self.decode_token(token)?.user_id()
    }

    /// Decode and validate a token
    ///
    /// # Errors
    /// Returns an error if the token is invalid or expired
    pub fn decode_token(&self, token: &str) -> Result<Claims, AppError> {
        let validation = Validation::default();

        let token_data =
            decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::TokenExpired,
                    _ => AppError::InvalidToken,
                }
            })?;

        Ok(token_data.claims)
    }

    /// Issue a token for a user
    ///
    /// # Errors
    /// Returns an error if token encoding fails
    pub fn issue_token(&self, user_id: Snowflake) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.token_expiry_secs)).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Failed to encode JWT")))
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("token_expiry_secs", &self.token_expiry_secs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_service() -> TokenService {
        TokenService::new("test-secret-key-that-is-long-enough", 604_800)
    }

    #[test]
    fn test_issue_and_authenticate() {
        let service = create_test_service();
        let user_id = Snowflake::new(12345);

        let token = service.issue_token(user_id).unwrap();
        assert_eq!(service.authenticate(&token).unwrap(), user_id);
    }

    #[test]
    fn test_invalid_token() {
        let service = create_test_service();

        let result = service.authenticate("invalid.token.here");
        assert!(matches!(result, Err(AppError::InvalidToken)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let service = create_test_service();
        let other = TokenService::new("a-completely-different-secret-key", 604_800);

        let token = other.issue_token(Snowflake::new(1)).unwrap();
        assert!(service.authenticate(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let service = TokenService::new("test-secret-key-that-is-long-enough", -3600);

        let token = service.issue_token(Snowflake::new(1)).unwrap();
        assert!(matches!(
            service.authenticate(&token),
            Err(AppError::TokenExpired)
        ));
    }

    #[test]
    fn test_claims_user_id() {
        let claims = Claims {
            sub: "12345".to_string(),
            iat: 0,
            exp: i64::MAX,
        };

        assert_eq!(claims.user_id().unwrap(), Snowflake::new(12345));
    }
}
