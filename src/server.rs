// ABOUTME: HTTP server assembly binding the route groups and ingestion engine together
// ABOUTME: Owns the listen socket, middleware stack, and graceful shutdown
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project

use crate::database::Database;
use crate::resources::ServerResources;
use crate::routes;
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Request bodies above this size are rejected before the handler runs
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Control-plane requests must complete within this window
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How often expired sessions and old audit entries are pruned
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Audit retention when the `retention_days` setting is absent
const DEFAULT_RETENTION_DAYS: i64 = 90;

/// The LogHaven server: REST control plane plus ingestion listeners
pub struct LogHavenServer {
    resources: Arc<ServerResources>,
}

impl LogHavenServer {
    /// Create a server from shared resources
    #[must_use]
    pub const fn new(resources: Arc<ServerResources>) -> Self {
        Self { resources }
    }

    /// Start the ingestion listeners and serve HTTP until shutdown
    ///
    /// # Errors
    ///
    /// Returns an error if a listener fails to bind or the HTTP socket
    /// cannot be opened
    pub async fn run(self, port: u16) -> Result<()> {
        self.resources.engine.start().await?;
        tokio::spawn(run_maintenance(self.resources.database.clone()));

        // Layers run outside-in from the last one added: trace wraps cors
        // wraps timeout wraps the body limit
        let router = routes::router(Arc::clone(&self.resources))
            .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http());

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("Failed to bind HTTP port {port}"))?;
        info!(http.port = port, "HTTP control plane listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")?;

        info!("Server shut down");
        Ok(())
    }
}

/// Hourly cleanup of dead sessions and audit entries past retention
async fn run_maintenance(database: Database) {
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
    loop {
        interval.tick().await;

        match database.prune_sessions().await {
            Ok(0) => {}
            Ok(removed) => info!(sessions.pruned = removed, "Pruned dead sessions"),
            Err(e) => tracing::warn!("Session prune failed: {e}"),
        }

        let retention_days = match database.get_setting("retention_days").await {
            Ok(Some(value)) => value.as_i64().unwrap_or(DEFAULT_RETENTION_DAYS),
            Ok(None) => DEFAULT_RETENTION_DAYS,
            Err(e) => {
                tracing::warn!("Failed to read retention_days setting: {e}");
                DEFAULT_RETENTION_DAYS
            }
        };
        let cutoff = Utc::now() - chrono::Duration::days(retention_days.max(1));
        match database.prune_audit_events(cutoff).await {
            Ok(0) => {}
            Ok(removed) => info!(audit.pruned = removed, "Pruned audit entries past retention"),
            Err(e) => tracing::warn!("Audit prune failed: {e}"),
        }
    }
}

/// Resolve when the process receives SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install SIGINT handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("Failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
