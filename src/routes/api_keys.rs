// ABOUTME: API key management route handlers for user self-service key operations
// ABOUTME: The full key value appears in exactly one response, at creation
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project

use crate::errors::AppError;
use crate::models::{ApiKey, AuditEvent, CreateApiKeyRequest};
use crate::resources::ServerResources;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Key metadata as returned to clients; never includes hash or full key
#[derive(Debug, Serialize)]
struct ApiKeySummary {
    id: String,
    name: String,
    key_prefix: String,
    description: Option<String>,
    tier: String,
    rate_limit_requests: u32,
    is_active: bool,
    last_used_at: Option<String>,
    expires_at: Option<String>,
    created_at: String,
}

impl From<&ApiKey> for ApiKeySummary {
    fn from(key: &ApiKey) -> Self {
        Self {
            id: key.id.clone(),
            name: key.name.clone(),
            key_prefix: key.key_prefix.clone(),
            description: key.description.clone(),
            tier: key.tier.as_str().to_owned(),
            rate_limit_requests: key.rate_limit_requests,
            is_active: key.is_active,
            last_used_at: key.last_used_at.map(|t| t.to_rfc3339()),
            expires_at: key.expires_at.map(|t| t.to_rfc3339()),
            created_at: key.created_at.to_rfc3339(),
        }
    }
}

/// API key management routes
pub struct ApiKeyRoutes;

impl ApiKeyRoutes {
    /// Create all API key management routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/api-keys", post(Self::handle_create))
            .route("/api/api-keys", get(Self::handle_list))
            .route("/api/api-keys/:key_id", delete(Self::handle_deactivate))
            .route("/api/api-keys/:key_id/usage", get(Self::handle_usage))
            .with_state(resources)
    }

    /// Create a key; the full value is in this response and nowhere else
    async fn handle_create(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(request): Json<CreateApiKeyRequest>,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/api-keys").await?;

        let (api_key, full_key) = resources
            .api_key_manager
            .create_api_key(auth.user.id, request)?;

        resources
            .database
            .create_api_key(&api_key)
            .await
            .map_err(|e| AppError::database(format!("Failed to store API key: {e}")))?;

        let audit = AuditEvent::new("api_key.created", Some(auth.user.id))
            .with_target(api_key.id.clone())
            .with_detail(serde_json::json!({
                "name": api_key.name,
                "tier": api_key.tier.as_str(),
            }));
        if let Err(e) = resources.database.record_audit_event(&audit).await {
            tracing::error!("Failed to write audit event for key creation: {e}");
        }

        Ok((
            StatusCode::CREATED,
            Json(serde_json::json!({
                "api_key": full_key,
                "key": ApiKeySummary::from(&api_key),
                "warning": "Store this key now; it cannot be retrieved again"
            })),
        )
            .into_response())
    }

    async fn handle_list(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/api-keys").await?;

        let keys = resources
            .database
            .list_api_keys_for_user(auth.user.id)
            .await
            .map_err(|e| AppError::database(format!("Failed to list API keys: {e}")))?;

        let summaries: Vec<ApiKeySummary> = keys.iter().map(ApiKeySummary::from).collect();
        Ok((StatusCode::OK, Json(serde_json::json!({ "api_keys": summaries }))).into_response())
    }

    async fn handle_deactivate(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(key_id): Path<String>,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/api-keys/deactivate").await?;

        resources
            .database
            .deactivate_api_key(&key_id, auth.user.id)
            .await
            .map_err(|_| AppError::not_found("API key"))?;

        let audit =
            AuditEvent::new("api_key.deactivated", Some(auth.user.id)).with_target(key_id.clone());
        if let Err(e) = resources.database.record_audit_event(&audit).await {
            tracing::error!("Failed to write audit event for key deactivation: {e}");
        }

        Ok((
            StatusCode::OK,
            Json(serde_json::json!({ "key_id": key_id, "is_active": false })),
        )
            .into_response())
    }

    /// Usage stats for one of the caller's keys over the last 30 days
    async fn handle_usage(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(key_id): Path<String>,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/api-keys/usage").await?;

        let api_key = resources
            .database
            .get_api_key(&key_id)
            .await
            .map_err(|e| AppError::database(format!("API key lookup failed: {e}")))?
            .ok_or_else(|| AppError::not_found("API key"))?;

        // Owners see their own keys; admins see all
        if api_key.user_id != auth.user.id && !auth.user.is_admin() {
            return Err(AppError::not_found("API key"));
        }

        let end = Utc::now();
        let start = end - Duration::days(30);
        let stats = resources
            .database
            .get_api_key_usage_stats(&key_id, start, end)
            .await
            .map_err(|e| AppError::database(format!("Failed to load usage stats: {e}")))?;

        let current_month = resources
            .database
            .get_api_key_current_month_usage(&key_id)
            .await
            .map_err(|e| AppError::database(format!("Failed to load usage: {e}")))?;
        let rate_limit = resources
            .rate_limit_calculator
            .calculate_api_key_rate_limit(&api_key, current_month);

        Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "key_id": key_id,
                "period_days": 30,
                "stats": stats,
                "rate_limit": rate_limit,
            })),
        )
            .into_response())
    }
}
