// ABOUTME: Ingestion engine route handlers for status, recent events, and test parsing
// ABOUTME: Reads live counters and the in-memory ring; nothing here touches the database
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project

use crate::errors::AppError;
use crate::ingest::{IngestionEngine, Protocol};
use crate::resources::ServerResources;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Default and maximum page sizes for the recent-events view
const DEFAULT_RECENT_LIMIT: usize = 100;
const MAX_RECENT_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
struct TestParseRequest {
    protocol: String,
    payload: String,
}

#[derive(Debug, Default, Deserialize)]
struct RecentParams {
    #[serde(default)]
    limit: Option<usize>,
}

/// Ingestion status and diagnostics routes
pub struct IngestionRoutes;

impl IngestionRoutes {
    /// Create all ingestion routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/ingestion/status", get(Self::handle_status))
            .route("/api/ingestion/recent", get(Self::handle_recent))
            .route("/api/ingestion/test-parse", post(Self::handle_test_parse))
            .with_state(resources)
    }

    /// Listener inventory plus per-protocol counters since startup
    async fn handle_status(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        super::authenticate(&headers, &resources, "/api/ingestion/status").await?;

        let engine = &resources.engine;
        let snapshot = engine.stats().snapshot(engine.buffered_events());

        Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "listeners": engine.listeners(),
                "stats": snapshot,
            })),
        )
            .into_response())
    }

    /// Newest buffered events, most recent first
    async fn handle_recent(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(params): Query<RecentParams>,
    ) -> Result<Response, AppError> {
        super::authenticate(&headers, &resources, "/api/ingestion/recent").await?;

        let limit = params
            .limit
            .unwrap_or(DEFAULT_RECENT_LIMIT)
            .min(MAX_RECENT_LIMIT);
        let events = resources.engine.recent_events(limit);

        let count = events.len();
        Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "events": events,
                "count": count,
            })),
        )
            .into_response())
    }

    /// Run a payload through a protocol parser without ingesting it
    async fn handle_test_parse(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(request): Json<TestParseRequest>,
    ) -> Result<Response, AppError> {
        super::authenticate(&headers, &resources, "/api/ingestion/test-parse").await?;

        let protocol = Protocol::from_name(&request.protocol).ok_or_else(|| {
            AppError::invalid_input(format!("Unknown protocol: {}", request.protocol))
        })?;

        match IngestionEngine::test_parse(protocol, request.payload.as_bytes()) {
            Ok(event) => Ok((
                StatusCode::OK,
                Json(serde_json::json!({ "parsed": true, "event": event })),
            )
                .into_response()),
            Err(e) => Ok((
                StatusCode::OK,
                Json(serde_json::json!({
                    "parsed": false,
                    "protocol": protocol.as_str(),
                    "error": e.to_string(),
                })),
            )
                .into_response()),
        }
    }
}
