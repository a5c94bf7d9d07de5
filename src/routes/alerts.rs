// ABOUTME: Alert rule CRUD route handlers
// ABOUTME: Rules are shared platform-wide; writes require the admin role
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project

use crate::errors::AppError;
use crate::ingest::Protocol;
use crate::models::{AlertRule, AuditEvent};
use crate::resources::ServerResources;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct CreateAlertRuleRequest {
    name: String,
    min_severity: u8,
    #[serde(default)]
    match_substring: Option<String>,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct UpdateAlertRuleRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    min_severity: Option<u8>,
    #[serde(default)]
    match_substring: Option<String>,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    enabled: Option<bool>,
}

/// Alert rule management routes
pub struct AlertRoutes;

impl AlertRoutes {
    /// Create all alert rule routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/alert-rules", post(Self::handle_create))
            .route("/api/alert-rules", get(Self::handle_list))
            .route("/api/alert-rules/:rule_id", put(Self::handle_update))
            .route("/api/alert-rules/:rule_id", delete(Self::handle_delete))
            .with_state(resources)
    }

    async fn handle_create(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(request): Json<CreateAlertRuleRequest>,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/alert-rules").await?;
        auth.require_admin()?;

        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::invalid_input("Rule name must not be empty"));
        }
        Self::validate_severity(request.min_severity)?;
        if let Some(protocol) = &request.protocol {
            Self::validate_protocol(protocol)?;
        }

        let rule = AlertRule {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            min_severity: request.min_severity,
            match_substring: request.match_substring,
            protocol: request.protocol,
            enabled: request.enabled,
            trigger_count: 0,
            last_triggered_at: None,
            created_at: Utc::now(),
        };

        resources
            .database
            .create_alert_rule(&rule)
            .await
            .map_err(|e| AppError::database(format!("Failed to create alert rule: {e}")))?;

        Self::audit(&resources, auth.user.id, "alert_rule.created", rule.id).await;

        Ok((StatusCode::CREATED, Json(rule)).into_response())
    }

    async fn handle_list(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        super::authenticate(&headers, &resources, "/api/alert-rules").await?;

        let rules = resources
            .database
            .list_alert_rules()
            .await
            .map_err(|e| AppError::database(format!("Failed to list alert rules: {e}")))?;

        Ok((StatusCode::OK, Json(serde_json::json!({ "alert_rules": rules }))).into_response())
    }

    /// Partial update; absent fields keep their stored values
    async fn handle_update(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(rule_id): Path<Uuid>,
        Json(request): Json<UpdateAlertRuleRequest>,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/alert-rules").await?;
        auth.require_admin()?;

        let mut rule = resources
            .database
            .get_alert_rule(rule_id)
            .await
            .map_err(|e| AppError::database(format!("Alert rule lookup failed: {e}")))?
            .ok_or_else(|| AppError::not_found("Alert rule"))?;

        if let Some(name) = request.name {
            let name = name.trim().to_owned();
            if name.is_empty() {
                return Err(AppError::invalid_input("Rule name must not be empty"));
            }
            rule.name = name;
        }
        if let Some(min_severity) = request.min_severity {
            Self::validate_severity(min_severity)?;
            rule.min_severity = min_severity;
        }
        if let Some(substring) = request.match_substring {
            rule.match_substring = if substring.is_empty() {
                None
            } else {
                Some(substring)
            };
        }
        if let Some(protocol) = request.protocol {
            if protocol.is_empty() {
                rule.protocol = None;
            } else {
                Self::validate_protocol(&protocol)?;
                rule.protocol = Some(protocol);
            }
        }
        if let Some(enabled) = request.enabled {
            rule.enabled = enabled;
        }

        resources
            .database
            .update_alert_rule(&rule)
            .await
            .map_err(|e| AppError::database(format!("Failed to update alert rule: {e}")))?;

        Self::audit(&resources, auth.user.id, "alert_rule.updated", rule.id).await;

        Ok((StatusCode::OK, Json(rule)).into_response())
    }

    async fn handle_delete(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(rule_id): Path<Uuid>,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/alert-rules").await?;
        auth.require_admin()?;

        resources
            .database
            .delete_alert_rule(rule_id)
            .await
            .map_err(|_| AppError::not_found("Alert rule"))?;

        Self::audit(&resources, auth.user.id, "alert_rule.deleted", rule_id).await;

        Ok((StatusCode::NO_CONTENT, ()).into_response())
    }

    fn validate_severity(min_severity: u8) -> Result<(), AppError> {
        if min_severity > 7 {
            return Err(AppError::invalid_input(
                "min_severity must be between 0 (emerg) and 7 (debug)",
            ));
        }
        Ok(())
    }

    fn validate_protocol(protocol: &str) -> Result<(), AppError> {
        if Protocol::from_name(protocol).is_none() {
            return Err(AppError::invalid_input(format!(
                "Unknown protocol: {protocol}"
            )));
        }
        Ok(())
    }

    async fn audit(resources: &Arc<ServerResources>, actor: Uuid, action: &str, rule_id: Uuid) {
        let event = AuditEvent::new(action, Some(actor)).with_target(rule_id.to_string());
        if let Err(e) = resources.database.record_audit_event(&event).await {
            tracing::error!("Failed to write audit event {action}: {e}");
        }
    }
}
