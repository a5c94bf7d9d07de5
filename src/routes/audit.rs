// ABOUTME: Audit trail route handler with filtered queries
// ABOUTME: Admins see everything; other users see only their own actions
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project

use crate::database::AuditQuery;
use crate::errors::AppError;
use crate::resources::ServerResources;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
struct AuditTrailParams {
    action: Option<String>,
    user_id: Option<Uuid>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    #[serde(default)]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

/// Audit trail routes
pub struct AuditRoutes;

impl AuditRoutes {
    /// Create the audit trail route
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/audit-trail", get(Self::handle_query))
            .with_state(resources)
    }

    async fn handle_query(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(params): Query<AuditTrailParams>,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/audit-trail").await?;

        // Non-admins may only read their own trail
        let user_filter = if auth.user.is_admin() {
            params.user_id
        } else {
            Some(auth.user.id)
        };

        let query = AuditQuery {
            user_id: user_filter,
            action_prefix: params.action,
            since: params.since,
            until: params.until,
            limit: params.limit,
            offset: params.offset,
        };

        let events = resources
            .database
            .query_audit_events(&query)
            .await
            .map_err(|e| AppError::database(format!("Failed to query audit trail: {e}")))?;

        let total = resources
            .database
            .count_audit_events()
            .await
            .map_err(|e| AppError::database(format!("Failed to count audit events: {e}")))?;

        let count = events.len();
        Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "events": events,
                "count": count,
                "total": total,
            })),
        )
            .into_response())
    }
}
