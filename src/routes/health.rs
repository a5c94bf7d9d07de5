// ABOUTME: Health check route handlers for service monitoring
// ABOUTME: Liveness plus readiness with a database ping
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 LogHaven Project

use crate::resources::ServerResources;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

/// Health routes implementation
pub struct HealthRoutes;

impl HealthRoutes {
    /// Create all health check routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/health", get(Self::handle_health))
            .route("/ready", get(Self::handle_ready))
            .with_state(resources)
    }

    async fn handle_health() -> Json<serde_json::Value> {
        Json(serde_json::json!({
            "status": "healthy",
            "service": crate::logging::SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))
    }

    /// Readiness requires a working database connection
    async fn handle_ready(State(resources): State<Arc<ServerResources>>) -> Response {
        let db_ok = sqlx::query("SELECT 1")
            .fetch_one(resources.database.pool())
            .await
            .is_ok();

        let status = if db_ok {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };

        (
            status,
            Json(serde_json::json!({
                "status": if db_ok { "ready" } else { "not_ready" },
                "database": if db_ok { "ok" } else { "unreachable" },
                "timestamp": chrono::Utc::now().to_rfc3339()
            })),
        )
            .into_response()
    }
}
