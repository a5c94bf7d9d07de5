// ABOUTME: Dashboard CRUD route handlers
// ABOUTME: Layouts are validated against the widget grid before they are stored
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project

use crate::errors::AppError;
use crate::models::{AuditEvent, Dashboard, DashboardLayout};
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
struct CreateDashboardRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    layout: Option<DashboardLayout>,
}

#[derive(Debug, Deserialize)]
struct UpdateDashboardRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    layout: Option<DashboardLayout>,
}

/// Dashboard management routes
pub struct DashboardRoutes;

impl DashboardRoutes {
    /// Create all dashboard routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/dashboards", post(Self::handle_create))
            .route("/api/dashboards", get(Self::handle_list))
            .route("/api/dashboards/:dashboard_id", get(Self::handle_get))
            .route("/api/dashboards/:dashboard_id", put(Self::handle_update))
            .route("/api/dashboards/:dashboard_id", delete(Self::handle_delete))
            .with_state(resources)
    }

    async fn handle_create(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(request): Json<CreateDashboardRequest>,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/dashboards").await?;

        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::invalid_input("Dashboard name must not be empty"));
        }

        let layout = request.layout.unwrap_or_default();
        layout
            .validate()
            .map_err(|e| AppError::invalid_input(format!("Invalid layout: {e}")))?;

        let now = Utc::now();
        let dashboard = Dashboard {
            id: Uuid::new_v4(),
            user_id: auth.user.id,
            name: name.to_owned(),
            description: request.description,
            layout,
            created_at: now,
            updated_at: now,
        };

        resources
            .database
            .create_dashboard(&dashboard)
            .await
            .map_err(|e| AppError::database(format!("Failed to create dashboard: {e}")))?;

        let audit = AuditEvent::new("dashboard.created", Some(auth.user.id))
            .with_target(dashboard.id.to_string());
        if let Err(e) = resources.database.record_audit_event(&audit).await {
            tracing::error!("Failed to write audit event for dashboard creation: {e}");
        }

        Ok((StatusCode::CREATED, Json(dashboard)).into_response())
    }

    async fn handle_list(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/dashboards").await?;

        let dashboards = resources
            .database
            .list_dashboards_for_user(auth.user.id)
            .await
            .map_err(|e| AppError::database(format!("Failed to list dashboards: {e}")))?;

        Ok((
            StatusCode::OK,
            Json(serde_json::json!({ "dashboards": dashboards })),
        )
            .into_response())
    }

    async fn handle_get(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(dashboard_id): Path<Uuid>,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/dashboards").await?;

        let dashboard = Self::load_owned(&resources, dashboard_id, auth.user.id).await?;
        Ok((StatusCode::OK, Json(dashboard)).into_response())
    }

    /// Partial update; absent fields keep their stored values
    async fn handle_update(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(dashboard_id): Path<Uuid>,
        Json(request): Json<UpdateDashboardRequest>,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/dashboards").await?;

        let mut dashboard = Self::load_owned(&resources, dashboard_id, auth.user.id).await?;

        if let Some(name) = request.name {
            let name = name.trim().to_owned();
            if name.is_empty() {
                return Err(AppError::invalid_input("Dashboard name must not be empty"));
            }
            dashboard.name = name;
        }
        if let Some(description) = request.description {
            dashboard.description = Some(description);
        }
        if let Some(layout) = request.layout {
            layout
                .validate()
                .map_err(|e| AppError::invalid_input(format!("Invalid layout: {e}")))?;
            dashboard.layout = layout;
        }
        dashboard.updated_at = Utc::now();

        resources
            .database
            .update_dashboard(&dashboard)
            .await
            .map_err(|e| AppError::database(format!("Failed to update dashboard: {e}")))?;

        let audit = AuditEvent::new("dashboard.updated", Some(auth.user.id))
            .with_target(dashboard.id.to_string());
        if let Err(e) = resources.database.record_audit_event(&audit).await {
            tracing::error!("Failed to write audit event for dashboard update: {e}");
        }

        Ok((StatusCode::OK, Json(dashboard)).into_response())
    }

    async fn handle_delete(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(dashboard_id): Path<Uuid>,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/dashboards").await?;

        resources
            .database
            .delete_dashboard(dashboard_id, auth.user.id)
            .await
            .map_err(|_| AppError::not_found("Dashboard"))?;

        let audit = AuditEvent::new("dashboard.deleted", Some(auth.user.id))
            .with_target(dashboard_id.to_string());
        if let Err(e) = resources.database.record_audit_event(&audit).await {
            tracing::error!("Failed to write audit event for dashboard deletion: {e}");
        }

        Ok((StatusCode::NO_CONTENT, ()).into_response())
    }

    /// Load a dashboard the caller owns; anyone else gets not-found
    async fn load_owned(
        resources: &Arc<ServerResources>,
        dashboard_id: Uuid,
        user_id: Uuid,
    ) -> Result<Dashboard, AppError> {
        let dashboard = resources
            .database
            .get_dashboard(dashboard_id)
            .await
            .map_err(|e| AppError::database(format!("Dashboard lookup failed: {e}")))?
            .ok_or_else(|| AppError::not_found("Dashboard"))?;

        if dashboard.user_id != user_id {
            return Err(AppError::not_found("Dashboard"));
        }
        Ok(dashboard)
    }
}
