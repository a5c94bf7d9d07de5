// ABOUTME: API key management system for authentication and rate limiting
// ABOUTME: Handles creation, validation, and lifecycle of API keys with tier-based limits
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 LogHaven Project

//! # API Key Management
//!
//! Key generation, format validation, and hashing for programmatic
//! access to the admin API. The full key value is shown exactly once at
//! creation; only the SHA-256 digest and a short prefix are stored.

use crate::errors::{AppError, AppResult};
use crate::models::{ApiKey, ApiKeyData, ApiKeyTier, CreateApiKeyRequest};
use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Prefix for production keys
const LIVE_PREFIX: &str = "lh_live_";
/// Prefix for trial keys
const TRIAL_PREFIX: &str = "lh_trial_";
/// Stored prefix length used to identify keys without the full value
const KEY_PREFIX_LEN: usize = 12;

/// API Key Manager
#[derive(Clone)]
pub struct ApiKeyManager {
    key_prefix: &'static str,
}

impl Default for ApiKeyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiKeyManager {
    /// Create a new API key manager
    #[must_use]
    pub const fn new() -> Self {
        Self {
            key_prefix: LIVE_PREFIX,
        }
    }

    /// Generate a new API key with optional trial prefix
    #[must_use]
    pub fn generate_api_key(&self, is_trial: bool) -> ApiKeyData {
        let random_bytes: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        // Full key format: lh_live_<32 random chars> or lh_trial_<32 random chars>
        let prefix = if is_trial { TRIAL_PREFIX } else { self.key_prefix };
        let full_key = format!("{prefix}{random_bytes}");

        let key_prefix = self.extract_key_prefix(&full_key);

        let mut hasher = Sha256::new();
        hasher.update(full_key.as_bytes());
        let key_hash = format!("{:x}", hasher.finalize());

        ApiKeyData {
            full_key,
            key_prefix,
            key_hash,
        }
    }

    /// Validate an API key format
    ///
    /// # Errors
    ///
    /// Returns an error if the API key format is invalid or has incorrect length
    pub fn validate_key_format(&self, api_key: &str) -> AppResult<()> {
        if !api_key.starts_with(self.key_prefix) && !api_key.starts_with(TRIAL_PREFIX) {
            return Err(AppError::invalid_input("Invalid API key format"));
        }

        let expected_len = if api_key.starts_with(TRIAL_PREFIX) {
            TRIAL_PREFIX.len() + 32
        } else {
            LIVE_PREFIX.len() + 32
        };

        if api_key.len() != expected_len {
            return Err(AppError::invalid_input("Invalid API key length"));
        }

        Ok(())
    }

    /// Extract key prefix from full key
    #[must_use]
    pub fn extract_key_prefix(&self, api_key: &str) -> String {
        api_key.chars().take(KEY_PREFIX_LEN).collect()
    }

    /// Hash an API key for comparison
    #[must_use]
    pub fn hash_key(&self, api_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(api_key.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Check if an API key string is a trial key
    #[must_use]
    pub fn is_trial_key(&self, api_key: &str) -> bool {
        api_key.starts_with(TRIAL_PREFIX)
    }

    /// Create a new API key record
    ///
    /// Tier is derived from the requested monthly rate limit. Returns the
    /// record for storage plus the full key, which is the caller's only
    /// chance to hand the value to the user.
    ///
    /// # Errors
    ///
    /// Returns an error if the request name is empty
    pub fn create_api_key(
        &self,
        user_id: Uuid,
        request: CreateApiKeyRequest,
    ) -> AppResult<(ApiKey, String)> {
        if request.name.trim().is_empty() {
            return Err(AppError::invalid_input("API key name must not be empty"));
        }

        let tier = if request.rate_limit_requests <= 1_000 {
            ApiKeyTier::Trial
        } else if request.rate_limit_requests <= 10_000 {
            ApiKeyTier::Starter
        } else if request.rate_limit_requests <= 100_000 {
            ApiKeyTier::Professional
        } else {
            ApiKeyTier::Enterprise
        };

        let is_trial = tier.is_trial();
        let api_key_data = self.generate_api_key(is_trial);

        // Trial keys always expire; others only when the caller asks
        let expires_at = if is_trial {
            let days = request
                .expires_in_days
                .or_else(|| tier.default_trial_days())
                .unwrap_or(14);
            Some(Utc::now() + Duration::days(days))
        } else {
            request
                .expires_in_days
                .map(|days| Utc::now() + Duration::days(days))
        };

        let rate_limit_requests = if request.rate_limit_requests == 0 {
            1_000_000_000 // Effectively unlimited but fits in database constraints
        } else {
            request.rate_limit_requests
        };

        let api_key = ApiKey {
            id: Uuid::new_v4().to_string(),
            user_id,
            name: request.name,
            key_prefix: api_key_data.key_prefix,
            key_hash: api_key_data.key_hash,
            description: request.description,
            tier,
            rate_limit_requests,
            rate_limit_window_seconds: tier.rate_limit_window(),
            is_active: true,
            last_used_at: None,
            expires_at,
            created_at: Utc::now(),
        };

        Ok((api_key, api_key_data.full_key))
    }

    /// Check whether a stored key record is currently usable
    ///
    /// # Errors
    ///
    /// Returns an error naming the first disqualifying condition
    pub fn is_key_valid(&self, api_key: &ApiKey) -> AppResult<()> {
        if !api_key.is_active {
            return Err(AppError::auth_invalid("API key is deactivated"));
        }

        if let Some(expires_at) = api_key.expires_at {
            if expires_at < Utc::now() {
                return Err(AppError::auth_expired(format!(
                    "API key expired at {}",
                    expires_at.to_rfc3339()
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_api_key_shape() {
        let manager = ApiKeyManager::new();
        let data = manager.generate_api_key(false);

        assert!(data.full_key.starts_with("lh_live_"));
        assert_eq!(data.full_key.len(), 40);
        assert_eq!(data.key_prefix.len(), 12);
        assert_eq!(data.key_hash.len(), 64);
        assert_eq!(data.key_hash, manager.hash_key(&data.full_key));
    }

    #[test]
    fn test_trial_key_prefix() {
        let manager = ApiKeyManager::new();
        let data = manager.generate_api_key(true);

        assert!(data.full_key.starts_with("lh_trial_"));
        assert!(manager.is_trial_key(&data.full_key));
        assert!(manager.validate_key_format(&data.full_key).is_ok());
    }

    #[test]
    fn test_validate_key_format_rejects_garbage() {
        let manager = ApiKeyManager::new();
        assert!(manager.validate_key_format("sk_live_abc").is_err());
        assert!(manager.validate_key_format("lh_live_tooshort").is_err());
    }

    #[test]
    fn test_create_api_key_tier_derivation() {
        let manager = ApiKeyManager::new();
        let user_id = Uuid::new_v4();

        let (key, full) = manager
            .create_api_key(
                user_id,
                CreateApiKeyRequest {
                    name: "ci pipeline".into(),
                    description: None,
                    rate_limit_requests: 50_000,
                    expires_in_days: None,
                },
            )
            .unwrap();

        assert_eq!(key.tier, ApiKeyTier::Professional);
        assert_eq!(key.user_id, user_id);
        assert!(key.expires_at.is_none());
        assert!(full.starts_with("lh_live_"));
        assert_eq!(key.key_hash, manager.hash_key(&full));
    }

    #[test]
    fn test_trial_keys_always_expire() {
        let manager = ApiKeyManager::new();
        let (key, full) = manager
            .create_api_key(
                Uuid::new_v4(),
                CreateApiKeyRequest {
                    name: "trial".into(),
                    description: None,
                    rate_limit_requests: 500,
                    expires_in_days: None,
                },
            )
            .unwrap();

        assert_eq!(key.tier, ApiKeyTier::Trial);
        assert!(key.expires_at.is_some());
        assert!(full.starts_with("lh_trial_"));
    }

    #[test]
    fn test_empty_name_rejected() {
        let manager = ApiKeyManager::new();
        let result = manager.create_api_key(
            Uuid::new_v4(),
            CreateApiKeyRequest {
                name: "  ".into(),
                description: None,
                rate_limit_requests: 1_000,
                expires_in_days: None,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_expired_key_invalid() {
        let manager = ApiKeyManager::new();
        let (mut key, _) = manager
            .create_api_key(
                Uuid::new_v4(),
                CreateApiKeyRequest {
                    name: "k".into(),
                    description: None,
                    rate_limit_requests: 5_000,
                    expires_in_days: None,
                },
            )
            .unwrap();

        assert!(manager.is_key_valid(&key).is_ok());
        key.expires_at = Some(Utc::now() - Duration::hours(1));
        assert!(manager.is_key_valid(&key).is_err());
        key.expires_at = None;
        key.is_active = false;
        assert!(manager.is_key_valid(&key).is_err());
    }
}
