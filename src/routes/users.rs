// ABOUTME: User administration route handlers
// ABOUTME: Listing, approval, suspension, and deletion; admin role required
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project

use crate::errors::AppError;
use crate::models::{AuditEvent, UserRole, UserStatus};
use crate::resources::ServerResources;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct UpdateRoleRequest {
    role: String,
}

/// User administration routes
pub struct UserRoutes;

impl UserRoutes {
    /// Create all user administration routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/users", get(Self::handle_list_users))
            .route("/api/users/:user_id/approve", post(Self::handle_approve))
            .route("/api/users/:user_id/suspend", post(Self::handle_suspend))
            .route("/api/users/:user_id/role", put(Self::handle_update_role))
            .route("/api/users/:user_id", delete(Self::handle_delete))
            .with_state(resources)
    }

    async fn handle_list_users(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/users").await?;
        auth.require_admin()?;

        let users = resources
            .database
            .list_users()
            .await
            .map_err(|e| AppError::database(format!("Failed to list users: {e}")))?;

        let pending = resources
            .database
            .count_users_with_status(UserStatus::Pending)
            .await
            .map_err(|e| AppError::database(format!("Failed to count users: {e}")))?;

        Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "users": users,
                "pending_count": pending,
            })),
        )
            .into_response())
    }

    async fn handle_approve(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(user_id): Path<Uuid>,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/users/approve").await?;
        auth.require_admin()?;

        let target = resources
            .database
            .get_user(user_id)
            .await
            .map_err(|e| AppError::database(format!("User lookup failed: {e}")))?
            .ok_or_else(|| AppError::not_found("User"))?;

        if target.status == UserStatus::Active {
            return Err(AppError::invalid_input("User is already active"));
        }

        resources
            .database
            .update_user_status(user_id, UserStatus::Active)
            .await
            .map_err(|e| AppError::database(format!("Failed to approve user: {e}")))?;

        Self::audit(&resources, &auth.user.id, "user.approved", user_id).await;

        Ok((
            StatusCode::OK,
            Json(serde_json::json!({ "user_id": user_id, "status": "active" })),
        )
            .into_response())
    }

    async fn handle_suspend(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(user_id): Path<Uuid>,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/users/suspend").await?;
        auth.require_admin()?;

        if user_id == auth.user.id {
            return Err(AppError::invalid_input("You cannot suspend your own account"));
        }

        resources
            .database
            .update_user_status(user_id, UserStatus::Suspended)
            .await
            .map_err(|_| AppError::not_found("User"))?;

        // Suspension takes effect immediately: kill live sessions
        if let Err(e) = resources.database.revoke_sessions_for_user(user_id).await {
            tracing::error!("Failed to revoke sessions for suspended user {user_id}: {e}");
        }

        Self::audit(&resources, &auth.user.id, "user.suspended", user_id).await;

        Ok((
            StatusCode::OK,
            Json(serde_json::json!({ "user_id": user_id, "status": "suspended" })),
        )
            .into_response())
    }

    async fn handle_update_role(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(user_id): Path<Uuid>,
        Json(request): Json<UpdateRoleRequest>,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/users/role").await?;
        auth.require_admin()?;

        let role = match request.role.as_str() {
            "admin" => UserRole::Admin,
            "user" => UserRole::User,
            other => {
                return Err(AppError::invalid_input(format!("Unknown role: {other}")));
            }
        };

        if user_id == auth.user.id && role != UserRole::Admin {
            return Err(AppError::invalid_input(
                "You cannot remove your own admin role",
            ));
        }

        resources
            .database
            .update_user_role(user_id, role)
            .await
            .map_err(|_| AppError::not_found("User"))?;

        Self::audit(&resources, &auth.user.id, "user.role_changed", user_id).await;

        Ok((
            StatusCode::OK,
            Json(serde_json::json!({ "user_id": user_id, "role": role.as_str() })),
        )
            .into_response())
    }

    async fn handle_delete(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(user_id): Path<Uuid>,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/users/delete").await?;
        auth.require_admin()?;

        if user_id == auth.user.id {
            return Err(AppError::invalid_input("You cannot delete your own account"));
        }

        resources
            .database
            .delete_user(user_id)
            .await
            .map_err(|_| AppError::not_found("User"))?;

        Self::audit(&resources, &auth.user.id, "user.deleted", user_id).await;

        Ok((StatusCode::NO_CONTENT, ()).into_response())
    }

    async fn audit(resources: &Arc<ServerResources>, actor: &Uuid, action: &str, target: Uuid) {
        let event = AuditEvent::new(action, Some(*actor)).with_target(target.to_string());
        if let Err(e) = resources.database.record_audit_event(&event).await {
            tracing::error!("Failed to write audit event {action}: {e}");
        }
    }
}
