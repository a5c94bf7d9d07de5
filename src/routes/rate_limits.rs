// ABOUTME: Rate limit overview route handler
// ABOUTME: Reports usage, limit, and reset time for each of the caller's keys
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project

use crate::errors::AppError;
use crate::rate_limiting::UnifiedRateLimitCalculator;
use crate::resources::ServerResources;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

/// Rate limit overview routes
pub struct RateLimitRoutes;

impl RateLimitRoutes {
    /// Create the rate limit overview route
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/rate-limits", get(Self::handle_overview))
            .with_state(resources)
    }

    /// Per-key rate limit status for every active key the caller owns
    async fn handle_overview(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        let auth = super::authenticate(&headers, &resources, "/api/rate-limits").await?;

        let keys = resources
            .database
            .list_api_keys_for_user(auth.user.id)
            .await
            .map_err(|e| AppError::database(format!("Failed to list API keys: {e}")))?;

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys.iter().filter(|k| k.is_active) {
            let current_usage = resources
                .database
                .get_api_key_current_month_usage(&key.id)
                .await
                .map_err(|e| AppError::database(format!("Failed to load usage: {e}")))?;

            let info = resources
                .rate_limit_calculator
                .calculate_api_key_rate_limit(key, current_usage);
            let status = UnifiedRateLimitCalculator::to_rate_limit_status(&info);

            entries.push(serde_json::json!({
                "key_id": key.id,
                "name": key.name,
                "key_prefix": key.key_prefix,
                "tier": key.tier.as_str(),
                "rate_limit": status,
            }));
        }

        let count = entries.len();
        Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "rate_limits": entries,
                "count": count,
            })),
        )
            .into_response())
    }
}
