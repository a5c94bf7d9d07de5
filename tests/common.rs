// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides common database, auth, and user creation helpers
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project
#![allow(dead_code, clippy::missing_panics_doc)]

//! Shared test utilities for `loghaven`
//!
//! Common setup functions to reduce duplication across integration tests.

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use loghaven::{
    auth::AuthManager,
    config::ServerConfig,
    database::Database,
    ingest::IngestionEngine,
    models::{Session, User, UserRole, UserStatus},
    resources::ServerResources,
    routes,
};
use std::sync::{Arc, Once};
use tower::ServiceExt;
use uuid::Uuid;

/// Low bcrypt cost keeps test runs fast
const TEST_BCRYPT_COST: u32 = 4;

pub const TEST_PASSWORD: &str = "correct-horse-battery";

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Full server resources over an in-memory database with listeners disabled
pub async fn create_test_resources() -> Result<Arc<ServerResources>> {
    init_test_logging();
    let config = ServerConfig::for_testing();

    let database = Database::new(&config.database_url.to_connection_string()).await?;

    let auth_manager = AuthManager::new(config.jwt_secret.as_bytes(), config.token_expiry_hours);
    let engine = Arc::new(IngestionEngine::new(
        config.ingestion.clone(),
        database.clone(),
    ));

    Ok(Arc::new(ServerResources::new(
        database,
        auth_manager,
        engine,
        Arc::new(config),
    )))
}

/// The application router under test
pub fn test_router(resources: &Arc<ServerResources>) -> Router {
    routes::router(Arc::clone(resources))
}

/// Insert a user directly, bypassing the registration endpoint
pub async fn create_test_user(
    resources: &Arc<ServerResources>,
    email: &str,
    role: UserRole,
    status: UserStatus,
) -> Result<User> {
    let password_hash = bcrypt::hash(TEST_PASSWORD, TEST_BCRYPT_COST)?;
    let mut user = User::new(email.to_owned(), password_hash, None);
    user.role = role;
    user.status = status;
    resources.database.create_user(&user).await?;
    Ok(user)
}

/// Issue a JWT plus backing session for a user, as login would
pub async fn issue_token(resources: &Arc<ServerResources>, user: &User) -> Result<String> {
    let issued = resources.auth_manager.generate_token(user)?;
    let session = Session {
        jti: issued.jti.clone(),
        user_id: user.id,
        expires_at: issued.expires_at,
        revoked: false,
        ip_address: None,
        created_at: chrono::Utc::now(),
        last_seen_at: chrono::Utc::now(),
    };
    resources.database.create_session(&session).await?;
    Ok(issued.token)
}

/// An active admin together with a usable token
pub async fn create_admin_with_token(
    resources: &Arc<ServerResources>,
) -> Result<(User, String)> {
    let email = format!("admin-{}@example.com", Uuid::new_v4());
    let admin = create_test_user(resources, &email, UserRole::Admin, UserStatus::Active).await?;
    let token = issue_token(resources, &admin).await?;
    Ok((admin, token))
}

/// An active regular user together with a usable token
pub async fn create_user_with_token(
    resources: &Arc<ServerResources>,
) -> Result<(User, String)> {
    let email = format!("user-{}@example.com", Uuid::new_v4());
    let user = create_test_user(resources, &email, UserRole::User, UserStatus::Active).await?;
    let token = issue_token(resources, &user).await?;
    Ok((user, token))
}

/// Send one request through the router
pub async fn send_request(
    router: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    router.oneshot(request).await.unwrap()
}

/// Read a JSON response body
pub async fn response_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert a status and return the parsed body
pub async fn expect_json(response: Response, status: StatusCode) -> serde_json::Value {
    assert_eq!(response.status(), status);
    response_json(response).await
}
