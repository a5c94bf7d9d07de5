// ABOUTME: Tracing and logging status route handler
// ABOUTME: Reports the active log level, output format, and service identity
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project

use crate::errors::AppError;
use crate::logging::{LoggingConfig, SERVICE_NAME};
use crate::resources::ServerResources;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

/// Logging status routes
pub struct TracingRoutes;

impl TracingRoutes {
    /// Create the tracing status route
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/tracing/status", get(Self::handle_status))
            .with_state(resources)
    }

    async fn handle_status(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        super::authenticate(&headers, &resources, "/api/tracing/status").await?;

        let logging = LoggingConfig::from_env();

        Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "service": SERVICE_NAME,
                "version": env!("CARGO_PKG_VERSION"),
                "environment": resources.config.environment,
                "log_level": logging.level,
                "log_format": logging.format.as_str(),
            })),
        )
            .into_response())
    }
}
