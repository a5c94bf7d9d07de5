// ABOUTME: JWT-based user authentication and authorization system
// ABOUTME: Handles token generation, validation, and revocable session identifiers
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project

//! # Authentication and Session Management
//!
//! HS256 JWT authentication for the admin console. Every issued token
//! carries a `jti` claim recorded in the sessions table, so logout can
//! revoke a token before its natural expiry.

use crate::models::{User, UserRole};
use crate::rate_limiting::UnifiedRateLimitInfo;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Audience claim stamped into every issued token
pub const TOKEN_AUDIENCE: &str = "loghaven-console";

/// Convert a duration to a human-readable format
fn humanize_duration(duration: Duration) -> String {
    let total_secs = duration.num_seconds().abs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;

    if hours > 0 {
        format!("{hours} hours")
    } else if minutes > 0 {
        format!("{minutes} minutes")
    } else {
        format!("{total_secs} seconds")
    }
}

/// `JWT` validation error with detailed information
#[derive(Debug, Clone)]
pub enum JwtValidationError {
    /// Token has expired
    TokenExpired {
        /// When the token expired
        expired_at: DateTime<Utc>,
        /// Current time for reference
        current_time: DateTime<Utc>,
    },
    /// Token signature is invalid
    TokenInvalid {
        /// Reason for invalidity
        reason: String,
    },
    /// Token is malformed (not proper `JWT` format)
    TokenMalformed {
        /// Details about malformation
        details: String,
    },
}

impl std::fmt::Display for JwtValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TokenExpired {
                expired_at,
                current_time,
            } => {
                let expired_for = current_time.signed_duration_since(*expired_at);
                write!(
                    f,
                    "JWT token expired {} ago at {}",
                    humanize_duration(expired_for),
                    expired_at.format("%Y-%m-%d %H:%M:%S UTC")
                )
            }
            Self::TokenInvalid { reason } => {
                write!(f, "JWT token signature is invalid: {reason}")
            }
            Self::TokenMalformed { details } => {
                write!(f, "JWT token is malformed: {details}")
            }
        }
    }
}

impl std::error::Error for JwtValidationError {}

/// `JWT` claims for user authentication
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User `ID`
    pub sub: String,
    /// User email
    pub email: String,
    /// Role at issuance time
    pub role: String,
    /// Token identifier, recorded in the sessions table for revocation
    pub jti: String,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    /// Audience (who the token is intended for)
    pub aud: String,
}

/// Authentication result with user context and rate limiting info
#[derive(Debug)]
pub struct AuthResult {
    /// Authenticated user `ID`
    pub user_id: Uuid,
    /// Authentication method used
    pub auth_method: AuthMethod,
    /// Rate limit information (provided for both `API` keys and `JWT` tokens)
    pub rate_limit: UnifiedRateLimitInfo,
}

/// Authentication method used
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// `JWT` token authentication
    JwtToken {
        /// Session identifier from the token's `jti` claim
        jti: String,
    },
    /// `API` key authentication
    ApiKey {
        /// `API` key `ID`
        key_id: String,
        /// `API` key tier
        tier: String,
    },
}

impl AuthMethod {
    /// Get a human-readable display name for the authentication method
    #[must_use]
    pub const fn display_name(&self) -> &str {
        match self {
            Self::JwtToken { .. } => "JWT Token",
            Self::ApiKey { .. } => "API Key",
        }
    }

    /// Get detailed information about the authentication method
    #[must_use]
    pub fn details(&self) -> String {
        match self {
            Self::JwtToken { jti } => {
                format!("JWT Token (session: {jti})")
            }
            Self::ApiKey { key_id, tier } => {
                format!("API Key (tier: {tier}, id: {key_id})")
            }
        }
    }
}

/// A freshly issued token plus the session metadata to record for it
#[derive(Debug)]
pub struct IssuedToken {
    /// The encoded `JWT`
    pub token: String,
    /// Session identifier (the token's `jti` claim)
    pub jti: String,
    /// When the token expires
    pub expires_at: DateTime<Utc>,
}

/// Authentication manager for `JWT` tokens and user sessions
pub struct AuthManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiry_hours: i64,
    /// Monotonic counter to ensure unique timestamps for tokens
    token_counter: AtomicU64,
}

impl AuthManager {
    /// Create a new authentication manager from a shared secret
    #[must_use]
    pub fn new(secret: &[u8], token_expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            token_expiry_hours,
            token_counter: AtomicU64::new(0),
        }
    }

    /// Generate a `JWT` token for a user with HS256 signing
    ///
    /// # Errors
    ///
    /// Returns an error if JWT encoding fails due to invalid claims
    pub fn generate_token(&self, user: &User) -> Result<IssuedToken> {
        let now = Utc::now();
        let expiry = now + Duration::hours(self.token_expiry_hours);
        let jti = Uuid::new_v4().to_string();

        // Use atomic counter to ensure unique issued-at times
        let counter = self.token_counter.fetch_add(1, Ordering::Relaxed);
        let unique_iat =
            now.timestamp() * 1000 + i64::from(u32::try_from(counter % 1000).unwrap_or(0));

        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role.as_str().to_owned(),
            jti: jti.clone(),
            iat: unique_iat,
            exp: expiry.timestamp(),
            aud: TOKEN_AUDIENCE.to_owned(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("Failed to encode JWT token")?;

        Ok(IssuedToken {
            token,
            jti,
            expires_at: expiry,
        })
    }

    /// Validate an HS256 JWT token
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Token signature is invalid
    /// - Token has expired
    /// - Token is malformed or not valid JWT format
    /// - Token claims cannot be deserialized
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_audience(&[TOKEN_AUDIENCE]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::debug!("JWT validation failed: {:?}", e);
            e
        })?;

        Ok(token_data.claims)
    }

    /// Validate a token with detailed error information
    ///
    /// # Errors
    ///
    /// Returns a [`JwtValidationError`] classifying the failure
    pub fn validate_token_detailed(&self, token: &str) -> Result<Claims, JwtValidationError> {
        let claims = self.decode_token_claims(token)?;
        Self::validate_claims_expiry(&claims)?;
        Ok(claims)
    }

    /// Decode token claims without expiration validation
    fn decode_token_claims(&self, token: &str) -> Result<Claims, JwtValidationError> {
        let mut validation_no_exp = Validation::new(Algorithm::HS256);
        validation_no_exp.validate_exp = false;
        validation_no_exp.set_audience(&[TOKEN_AUDIENCE]);

        decode::<Claims>(token, &self.decoding_key, &validation_no_exp)
            .map(|token_data| token_data.claims)
            .map_err(|e| Self::convert_jwt_error(&e))
    }

    /// Validate claims expiration with detailed logging
    fn validate_claims_expiry(claims: &Claims) -> Result<(), JwtValidationError> {
        let current_time = Utc::now();
        let expired_at = DateTime::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now);

        if current_time.timestamp() > claims.exp {
            tracing::warn!(
                "JWT token expired for user: {} - Expired {} ago at {}",
                claims.sub,
                humanize_duration(current_time.signed_duration_since(expired_at)),
                expired_at.to_rfc3339()
            );
            return Err(JwtValidationError::TokenExpired {
                expired_at,
                current_time,
            });
        }
        Ok(())
    }

    /// Convert JWT library errors to detailed validation errors
    fn convert_jwt_error(e: &jsonwebtoken::errors::Error) -> JwtValidationError {
        use jsonwebtoken::errors::ErrorKind;

        match e.kind() {
            ErrorKind::InvalidSignature => JwtValidationError::TokenInvalid {
                reason: "Token signature verification failed".into(),
            },
            ErrorKind::InvalidToken => JwtValidationError::TokenMalformed {
                details: "Token format is invalid".into(),
            },
            ErrorKind::Base64(base64_err) => JwtValidationError::TokenMalformed {
                details: format!("Token contains invalid base64: {base64_err}"),
            },
            ErrorKind::Json(json_err) => JwtValidationError::TokenMalformed {
                details: format!("Token contains invalid JSON: {json_err}"),
            },
            ErrorKind::Utf8(utf8_err) => JwtValidationError::TokenMalformed {
                details: format!("Token contains invalid UTF-8: {utf8_err}"),
            },
            _ => JwtValidationError::TokenInvalid {
                reason: format!("Token validation failed: {e}"),
            },
        }
    }

    /// Extract user `ID` from a token without expiry validation
    ///
    /// Used for database lookups when the token might be expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the token signature is invalid, the token is
    /// malformed, or the subject is not a valid UUID
    pub fn extract_user_id(&self, token: &str) -> Result<Uuid> {
        let claims = self
            .decode_token_claims(token)
            .map_err(|e| anyhow::anyhow!("{e}"))?;

        Uuid::parse_str(&claims.sub)
            .with_context(|| format!("Failed to parse user ID from JWT subject: {}", claims.sub))
    }

    /// Parse the role claim back into a [`UserRole`]
    #[must_use]
    pub fn role_from_claims(claims: &Claims) -> UserRole {
        UserRole::from_str_or_default(&claims.role)
    }
}

/// Generate a random `JWT` secret
///
/// # Errors
///
/// Returns an error if system RNG fails - the server cannot operate
/// securely without a working RNG
pub fn generate_jwt_secret() -> Result<[u8; 64]> {
    use rand::RngCore;

    let mut secret = [0u8; 64];
    rand::thread_rng()
        .try_fill_bytes(&mut secret)
        .map_err(|e| anyhow::anyhow!("System RNG failure - cannot generate JWT secret: {e}"))?;

    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{UserStatus, User};

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "ops@example.com".into(),
            display_name: None,
            password_hash: "hash".into(),
            role: UserRole::Admin,
            status: UserStatus::Active,
            created_at: Utc::now(),
            last_active: Utc::now(),
        }
    }

    #[test]
    fn test_generate_and_validate_token() {
        let manager = AuthManager::new(b"test-secret", 24);
        let user = test_user();

        let issued = manager.generate_token(&user).unwrap();
        let claims = manager.validate_token(&issued.token).unwrap();

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.aud, TOKEN_AUDIENCE);
        assert_eq!(AuthManager::role_from_claims(&claims), UserRole::Admin);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let manager = AuthManager::new(b"secret-a", 24);
        let other = AuthManager::new(b"secret-b", 24);
        let issued = manager.generate_token(&test_user()).unwrap();

        assert!(other.validate_token(&issued.token).is_err());
        let detailed = other.validate_token_detailed(&issued.token);
        assert!(matches!(
            detailed,
            Err(JwtValidationError::TokenInvalid { .. })
        ));
    }

    #[test]
    fn test_expired_token_detailed_error() {
        let manager = AuthManager::new(b"test-secret", -1);
        let issued = manager.generate_token(&test_user()).unwrap();

        let result = manager.validate_token_detailed(&issued.token);
        assert!(matches!(
            result,
            Err(JwtValidationError::TokenExpired { .. })
        ));
    }

    #[test]
    fn test_extract_user_id_ignores_expiry() {
        let manager = AuthManager::new(b"test-secret", -1);
        let user = test_user();
        let issued = manager.generate_token(&user).unwrap();

        assert_eq!(manager.extract_user_id(&issued.token).unwrap(), user.id);
    }

    #[test]
    fn test_malformed_token() {
        let manager = AuthManager::new(b"test-secret", 24);
        let result = manager.validate_token_detailed("not-a-jwt");
        assert!(matches!(
            result,
            Err(JwtValidationError::TokenMalformed { .. })
        ));
    }
}
