// ABOUTME: HTTP route organization and shared request authentication
// ABOUTME: Each domain module contributes a Router merged into the app here
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 LogHaven Project

//! # REST API Routes
//!
//! Route groups follow one pattern: a unit struct with a `routes()`
//! constructor returning an `axum::Router` with the shared
//! [`ServerResources`] as state. Handlers authenticate via the
//! `Authorization` header, falling back to the `auth_token` cookie the
//! browser console sets.

pub mod alerts;
pub mod api_keys;
pub mod audit;
pub mod auth;
pub mod dashboards;
pub mod health;
pub mod ingestion;
pub mod rate_limits;
pub mod settings;
pub mod tracing_status;
pub mod users;

use crate::auth::{AuthMethod, JwtValidationError};
use crate::errors::AppError;
use crate::models::{ApiKeyUsage, User, UserStatus};
use crate::rate_limiting::UnifiedRateLimitInfo;
use crate::resources::ServerResources;
use axum::http::HeaderMap;
use axum::Router;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub use alerts::AlertRoutes;
pub use api_keys::ApiKeyRoutes;
pub use audit::AuditRoutes;
pub use auth::AuthRoutes;
pub use dashboards::DashboardRoutes;
pub use health::HealthRoutes;
pub use ingestion::IngestionRoutes;
pub use rate_limits::RateLimitRoutes;
pub use settings::SettingsRoutes;
pub use tracing_status::TracingRoutes;
pub use users::UserRoutes;

/// Authenticated request context handed to handlers
#[derive(Debug)]
pub struct AuthContext {
    /// The authenticated user
    pub user: User,
    /// How the request authenticated
    pub auth_method: AuthMethod,
    /// Rate limit state for the credential used
    pub rate_limit: UnifiedRateLimitInfo,
}

impl AuthContext {
    /// Error unless the user holds the admin role
    ///
    /// # Errors
    ///
    /// Returns a permission error for non-admin users
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.user.is_admin() {
            Ok(())
        } else {
            Err(AppError::permission_denied("Admin role required"))
        }
    }
}

/// Read a cookie value from request headers
#[must_use]
pub fn get_cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookies = headers.get("cookie")?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_owned())
    })
}

/// Pull the credential from the Authorization header or `auth_token` cookie
fn extract_credential(headers: &HeaderMap) -> Result<String, AppError> {
    if let Some(auth_header) = headers.get("authorization").and_then(|h| h.to_str().ok()) {
        let token = auth_header.strip_prefix("Bearer ").unwrap_or(auth_header);
        return Ok(token.to_owned());
    }
    if let Some(token) = get_cookie_value(headers, "auth_token") {
        return Ok(token);
    }
    Err(AppError::auth_required())
}

/// Authenticate a request with either a JWT or an API key
///
/// # Errors
///
/// Returns an auth error if the credential is missing, invalid, expired,
/// revoked, or belongs to a non-active user
pub async fn authenticate(
    headers: &HeaderMap,
    resources: &Arc<ServerResources>,
    endpoint: &str,
) -> Result<AuthContext, AppError> {
    let credential = extract_credential(headers)?;

    if credential.starts_with("lh_live_") || credential.starts_with("lh_trial_") {
        authenticate_api_key(&credential, resources, endpoint).await
    } else {
        authenticate_jwt(&credential, resources).await
    }
}

async fn authenticate_jwt(
    token: &str,
    resources: &Arc<ServerResources>,
) -> Result<AuthContext, AppError> {
    let claims = resources
        .auth_manager
        .validate_token_detailed(token)
        .map_err(|e| match e {
            JwtValidationError::TokenExpired { .. } => AppError::auth_expired(e.to_string()),
            JwtValidationError::TokenInvalid { .. } | JwtValidationError::TokenMalformed { .. } => {
                AppError::auth_invalid(e.to_string())
            }
        })?;

    // Sessions are revocable; the jti must still be live
    let session_valid = resources
        .database
        .is_session_valid(&claims.jti)
        .await
        .map_err(|e| AppError::database(format!("Session lookup failed: {e}")))?;
    if !session_valid {
        return Err(AppError::auth_invalid("Session has been revoked"));
    }

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::auth_invalid("Invalid user ID in token"))?;
    let user = resources
        .database
        .get_user(user_id)
        .await
        .map_err(|e| AppError::database(format!("User lookup failed: {e}")))?
        .ok_or_else(|| AppError::auth_invalid("User no longer exists"))?;

    if user.status != UserStatus::Active {
        return Err(AppError::permission_denied(format!(
            "Account is {}",
            user.status.as_str()
        )));
    }

    if let Err(e) = resources.database.touch_session(&claims.jti).await {
        tracing::debug!("Failed to touch session {}: {e}", claims.jti);
    }

    Ok(AuthContext {
        user,
        auth_method: AuthMethod::JwtToken { jti: claims.jti },
        rate_limit: UnifiedRateLimitInfo::unlimited("jwt_token"),
    })
}

async fn authenticate_api_key(
    key: &str,
    resources: &Arc<ServerResources>,
    endpoint: &str,
) -> Result<AuthContext, AppError> {
    let manager = &resources.api_key_manager;
    manager.validate_key_format(key)?;

    let key_hash = manager.hash_key(key);
    let api_key = resources
        .database
        .get_api_key_by_hash(&key_hash)
        .await
        .map_err(|e| AppError::database(format!("API key lookup failed: {e}")))?
        .ok_or_else(|| AppError::auth_invalid("Unknown API key"))?;

    manager.is_key_valid(&api_key)?;

    let current_usage = resources
        .database
        .get_api_key_current_month_usage(&api_key.id)
        .await
        .map_err(|e| AppError::database(format!("Usage lookup failed: {e}")))?;
    let rate_limit = resources
        .rate_limit_calculator
        .calculate_api_key_rate_limit(&api_key, current_usage);
    if rate_limit.is_rate_limited {
        return Err(AppError::rate_limit_exceeded(
            rate_limit.limit.unwrap_or(0),
            rate_limit.reset_at.unwrap_or_else(Utc::now),
        ));
    }

    let user = resources
        .database
        .get_user(api_key.user_id)
        .await
        .map_err(|e| AppError::database(format!("User lookup failed: {e}")))?
        .ok_or_else(|| AppError::auth_invalid("API key owner no longer exists"))?;

    if user.status != UserStatus::Active {
        return Err(AppError::permission_denied(format!(
            "Account is {}",
            user.status.as_str()
        )));
    }

    let usage = ApiKeyUsage {
        id: None,
        api_key_id: api_key.id.clone(),
        timestamp: Utc::now(),
        endpoint: endpoint.to_owned(),
        status_code: 200,
        response_time_ms: None,
    };
    if let Err(e) = resources.database.record_api_key_usage(&usage).await {
        tracing::debug!("Failed to record API key usage: {e}");
    }
    if let Err(e) = resources.database.update_api_key_last_used(&api_key.id).await {
        tracing::debug!("Failed to update API key last_used: {e}");
    }

    Ok(AuthContext {
        user,
        auth_method: AuthMethod::ApiKey {
            key_id: api_key.id,
            tier: api_key.tier.as_str().to_owned(),
        },
        rate_limit,
    })
}

/// Assemble every route group into the application router
#[must_use]
pub fn router(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .merge(HealthRoutes::routes(Arc::clone(&resources)))
        .merge(AuthRoutes::routes(Arc::clone(&resources)))
        .merge(UserRoutes::routes(Arc::clone(&resources)))
        .merge(ApiKeyRoutes::routes(Arc::clone(&resources)))
        .merge(SettingsRoutes::routes(Arc::clone(&resources)))
        .merge(AuditRoutes::routes(Arc::clone(&resources)))
        .merge(RateLimitRoutes::routes(Arc::clone(&resources)))
        .merge(DashboardRoutes::routes(Arc::clone(&resources)))
        .merge(AlertRoutes::routes(Arc::clone(&resources)))
        .merge(IngestionRoutes::routes(Arc::clone(&resources)))
        .merge(TracingRoutes::routes(resources))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            "theme=dark; auth_token=abc.def.ghi; other=1".parse().unwrap(),
        );
        assert_eq!(
            get_cookie_value(&headers, "auth_token").as_deref(),
            Some("abc.def.ghi")
        );
        assert_eq!(get_cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_credential_prefers_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer header-token".parse().unwrap());
        headers.insert("cookie", "auth_token=cookie-token".parse().unwrap());
        assert_eq!(extract_credential(&headers).unwrap(), "header-token");
    }

    #[test]
    fn test_missing_credential() {
        let headers = HeaderMap::new();
        assert!(extract_credential(&headers).is_err());
    }
}
