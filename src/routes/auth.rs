// ABOUTME: Authentication route handlers for registration, login, and logout
// ABOUTME: Issues HS256 JWTs backed by revocable server-side sessions
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project

use crate::auth::AuthMethod;
use crate::errors::AppError;
use crate::logging::AppLogger;
use crate::models::{AuditEvent, Session, User, UserStatus};
use crate::resources::ServerResources;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

/// Best-effort client address from proxy headers
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_owned())
}

/// Bcrypt cost factor for password hashing
const BCRYPT_COST: u32 = 12;

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    email: String,
    password: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

/// Authentication routes
pub struct AuthRoutes;

impl AuthRoutes {
    /// Create all authentication routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/auth/register", post(Self::handle_register))
            .route("/api/auth/login", post(Self::handle_login))
            .route("/api/auth/logout", post(Self::handle_logout))
            .route("/api/auth/sessions", get(Self::handle_list_sessions))
            .with_state(resources)
    }

    /// Register a new user; accounts start pending until approved
    async fn handle_register(
        State(resources): State<Arc<ServerResources>>,
        Json(request): Json<RegisterRequest>,
    ) -> Result<Response, AppError> {
        let email = request.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::invalid_input("A valid email address is required"));
        }
        if request.password.len() < 8 {
            return Err(AppError::invalid_input(
                "Password must be at least 8 characters",
            ));
        }

        let password_hash = bcrypt::hash(&request.password, BCRYPT_COST)
            .map_err(|e| AppError::internal(format!("Password hashing failed: {e}")))?;

        let user = User::new(email.clone(), password_hash, request.display_name);
        let user_id = resources
            .database
            .create_user(&user)
            .await
            .map_err(|_| AppError::already_exists("A user with this email"))?;

        let audit = AuditEvent::new("user.registered", Some(user_id)).with_target(email);
        if let Err(e) = resources.database.record_audit_event(&audit).await {
            tracing::error!("Failed to write audit event for registration: {e}");
        }
        AppLogger::log_auth_event(&user_id.to_string(), "register", true, None);

        Ok((
            StatusCode::CREATED,
            Json(serde_json::json!({
                "user_id": user_id,
                "status": "pending",
                "message": "Registration received; an administrator must approve the account"
            })),
        )
            .into_response())
    }

    /// Verify credentials and issue a JWT with a recorded session
    async fn handle_login(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(request): Json<LoginRequest>,
    ) -> Result<Response, AppError> {
        let email = request.email.trim().to_lowercase();
        let user = resources
            .database
            .get_user_by_email(&email)
            .await
            .map_err(|e| AppError::database(format!("User lookup failed: {e}")))?
            .ok_or_else(|| AppError::auth_invalid("Invalid email or password"))?;

        let password_ok = bcrypt::verify(&request.password, &user.password_hash)
            .map_err(|e| AppError::internal(format!("Password verification failed: {e}")))?;
        if !password_ok {
            AppLogger::log_auth_event(&user.id.to_string(), "login", false, Some("bad password"));
            return Err(AppError::auth_invalid("Invalid email or password"));
        }

        match user.status {
            UserStatus::Active => {}
            UserStatus::Pending => {
                return Err(AppError::permission_denied(
                    "Account is awaiting administrator approval",
                ));
            }
            UserStatus::Suspended => {
                AppLogger::log_security_event(
                    "login_attempt_suspended",
                    "medium",
                    "Login attempt on suspended account",
                    Some(&user.id.to_string()),
                );
                return Err(AppError::permission_denied("Account is suspended"));
            }
        }

        let issued = resources.auth_manager.generate_token(&user)?;
        let session = Session {
            jti: issued.jti.clone(),
            user_id: user.id,
            expires_at: issued.expires_at,
            revoked: false,
            ip_address: client_ip(&headers),
            created_at: Utc::now(),
            last_seen_at: Utc::now(),
        };
        resources
            .database
            .create_session(&session)
            .await
            .map_err(|e| AppError::database(format!("Failed to record session: {e}")))?;

        if let Err(e) = resources.database.update_last_active(user.id).await {
            tracing::debug!("Failed to update last_active: {e}");
        }
        AppLogger::log_auth_event(&user.id.to_string(), "login", true, None);

        Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "token": issued.token,
                "expires_at": issued.expires_at.to_rfc3339(),
                "user": {
                    "id": user.id,
                    "email": user.email,
                    "display_name": user.display_name,
                    "role": user.role,
                }
            })),
        )
            .into_response())
    }

    /// Revoke the session behind the presented token
    async fn handle_logout(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/auth/logout").await?;

        let AuthMethod::JwtToken { jti } = &auth.auth_method else {
            return Err(AppError::invalid_input(
                "Logout applies to JWT sessions, not API keys",
            ));
        };

        resources
            .database
            .revoke_session(jti)
            .await
            .map_err(|e| AppError::database(format!("Failed to revoke session: {e}")))?;
        AppLogger::log_auth_event(&auth.user.id.to_string(), "logout", true, None);

        Ok((
            StatusCode::OK,
            Json(serde_json::json!({ "message": "Logged out" })),
        )
            .into_response())
    }

    /// List the caller's active sessions
    async fn handle_list_sessions(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/auth/sessions").await?;

        let sessions = resources
            .database
            .list_sessions_for_user(auth.user.id)
            .await
            .map_err(|e| AppError::database(format!("Failed to list sessions: {e}")))?;

        Ok((StatusCode::OK, Json(serde_json::json!({ "sessions": sessions }))).into_response())
    }
}
