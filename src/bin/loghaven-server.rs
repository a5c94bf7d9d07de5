// ABOUTME: Server binary wiring configuration, database, auth, and listeners
// ABOUTME: Starts the REST control plane and all enabled ingestion protocols
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project

//! # LogHaven Server Binary
//!
//! Starts the admin control plane and the multi-protocol log ingestion
//! engine from environment-driven configuration.

use anyhow::Result;
use clap::Parser;
use loghaven::{
    auth::AuthManager,
    config::ServerConfig,
    database::Database,
    ingest::IngestionEngine,
    logging,
    resources::ServerResources,
    server::LogHavenServer,
};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "loghaven-server")]
#[command(about = "LogHaven - admin control plane and log ingestion engine")]
pub struct Args {
    /// Override the HTTP control-plane port
    #[arg(long)]
    http_port: Option<u16>,

    /// Override the database URL
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The subscriber must be live before config logs its summary
    logging::init_from_env()?;
    info!("Starting LogHaven server");

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }
    if let Some(database_url) = &args.database_url {
        config.database_url = loghaven::config::DatabaseUrl::parse_url(database_url);
    }

    let database = Database::new(&config.database_url.to_connection_string()).await?;
    info!("Database ready: {}", config.database_url.to_connection_string());

    let auth_manager = AuthManager::new(config.jwt_secret.as_bytes(), config.token_expiry_hours);

    let engine = Arc::new(IngestionEngine::new(
        config.ingestion.clone(),
        database.clone(),
    ));

    let http_port = config.http_port;
    let resources = Arc::new(ServerResources::new(
        database,
        auth_manager,
        engine,
        Arc::new(config),
    ));

    LogHavenServer::new(resources).run(http_port).await
}
