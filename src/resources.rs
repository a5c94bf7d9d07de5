// ABOUTME: Centralized resource container for dependency injection
// ABOUTME: Shares the database, auth manager, and ingestion engine across handlers
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project

//! # Server Resources
//!
//! One container holding every shared server resource, created at startup
//! and passed to route groups as `Arc<ServerResources>`. Keeps expensive
//! objects from being recreated per request.

use crate::api_keys::ApiKeyManager;
use crate::auth::AuthManager;
use crate::config::ServerConfig;
use crate::database::Database;
use crate::ingest::IngestionEngine;
use crate::rate_limiting::UnifiedRateLimitCalculator;
use std::sync::Arc;

/// Centralized resource container for dependency injection
#[derive(Clone)]
pub struct ServerResources {
    pub database: Database,
    pub auth_manager: Arc<AuthManager>,
    pub api_key_manager: ApiKeyManager,
    pub rate_limit_calculator: UnifiedRateLimitCalculator,
    pub engine: Arc<IngestionEngine>,
    pub config: Arc<ServerConfig>,
}

impl ServerResources {
    /// Create new server resources with proper Arc sharing
    #[must_use]
    pub fn new(
        database: Database,
        auth_manager: AuthManager,
        engine: Arc<IngestionEngine>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            database,
            auth_manager: Arc::new(auth_manager),
            api_key_manager: ApiKeyManager::new(),
            rate_limit_calculator: UnifiedRateLimitCalculator::new(),
            engine,
            config,
        }
    }
}
