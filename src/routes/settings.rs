// ABOUTME: System settings route handlers
// ABOUTME: Reads for any user, writes admin-only with audit attribution
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project

use crate::errors::AppError;
use crate::models::AuditEvent;
use crate::resources::ServerResources;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, put},
    Json, Router,
};
use std::sync::Arc;

/// Setting keys the console recognizes; writes to anything else are rejected
const KNOWN_KEYS: [&str; 5] = [
    "retention_days",
    "registration_enabled",
    "default_dashboard_columns",
    "alert_cooldown_seconds",
    "console_banner",
];

/// System settings routes
pub struct SettingsRoutes;

impl SettingsRoutes {
    /// Create all settings routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/settings", get(Self::handle_list))
            .route("/api/settings/:key", get(Self::handle_get))
            .route("/api/settings/:key", put(Self::handle_put))
            .route("/api/settings/:key", delete(Self::handle_delete))
            .with_state(resources)
    }

    async fn handle_list(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        super::authenticate(&headers, &resources, "/api/settings").await?;

        let settings = resources
            .database
            .list_settings()
            .await
            .map_err(|e| AppError::database(format!("Failed to list settings: {e}")))?;

        Ok((StatusCode::OK, Json(serde_json::json!({ "settings": settings }))).into_response())
    }

    async fn handle_get(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(key): Path<String>,
    ) -> Result<Response, AppError> {
        super::authenticate(&headers, &resources, "/api/settings").await?;

        let value = resources
            .database
            .get_setting(&key)
            .await
            .map_err(|e| AppError::database(format!("Failed to read setting: {e}")))?
            .ok_or_else(|| AppError::not_found("Setting"))?;

        Ok((
            StatusCode::OK,
            Json(serde_json::json!({ "key": key, "value": value })),
        )
            .into_response())
    }

    /// Upsert a setting; every write lands in the audit trail
    async fn handle_put(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(key): Path<String>,
        Json(value): Json<serde_json::Value>,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/settings").await?;
        auth.require_admin()?;

        if !KNOWN_KEYS.contains(&key.as_str()) {
            return Err(AppError::invalid_input(format!("Unknown setting key: {key}")));
        }

        let previous = resources
            .database
            .get_setting(&key)
            .await
            .map_err(|e| AppError::database(format!("Failed to read setting: {e}")))?;

        resources
            .database
            .set_setting(&key, &value, Some(auth.user.id))
            .await
            .map_err(|e| AppError::database(format!("Failed to write setting: {e}")))?;

        let audit = AuditEvent::new("setting.updated", Some(auth.user.id))
            .with_target(key.clone())
            .with_detail(serde_json::json!({
                "previous": previous,
                "new": value,
            }));
        if let Err(e) = resources.database.record_audit_event(&audit).await {
            tracing::error!("Failed to write audit event for setting update: {e}");
        }

        Ok((
            StatusCode::OK,
            Json(serde_json::json!({ "key": key, "value": value })),
        )
            .into_response())
    }

    /// Reset a setting back to its built-in default by removing the override
    async fn handle_delete(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(key): Path<String>,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/settings").await?;
        auth.require_admin()?;

        let existed = resources
            .database
            .delete_setting(&key)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete setting: {e}")))?;
        if !existed {
            return Err(AppError::not_found("Setting"));
        }

        let audit = AuditEvent::new("setting.deleted", Some(auth.user.id)).with_target(key);
        if let Err(e) = resources.database.record_audit_event(&audit).await {
            tracing::error!("Failed to write audit event for setting deletion: {e}");
        }

        Ok((StatusCode::NO_CONTENT, ()).into_response())
    }
}
