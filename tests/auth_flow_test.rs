// ABOUTME: End-to-end tests for registration, approval, login, and logout
// ABOUTME: Exercises the full account lifecycle through the HTTP router
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project

mod common;

use axum::http::{Method, StatusCode};
use common::{
    create_admin_with_token, create_test_resources, expect_json, send_request, test_router,
    TEST_PASSWORD,
};
use serde_json::json;

#[tokio::test]
async fn test_register_approve_login_flow() {
    let resources = create_test_resources().await.unwrap();

    // Register: account lands in pending
    let body = expect_json(
        send_request(
            test_router(&resources),
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "email": "new@example.com", "password": TEST_PASSWORD })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    assert_eq!(body["status"], "pending");
    let user_id = body["user_id"].as_str().unwrap().to_owned();

    // Pending accounts cannot log in yet
    let response = send_request(
        test_router(&resources),
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "new@example.com", "password": TEST_PASSWORD })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Admin approves
    let (_, admin_token) = create_admin_with_token(&resources).await.unwrap();
    let response = send_request(
        test_router(&resources),
        Method::POST,
        &format!("/api/users/{user_id}/approve"),
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Login now succeeds and returns a token
    let body = expect_json(
        send_request(
            test_router(&resources),
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "new@example.com", "password": TEST_PASSWORD })),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert!(body["token"].as_str().is_some());
    assert_eq!(body["user"]["email"], "new@example.com");
}

#[tokio::test]
async fn test_login_rejects_bad_password() {
    let resources = create_test_resources().await.unwrap();
    let (admin, _) = create_admin_with_token(&resources).await.unwrap();

    let response = send_request(
        test_router(&resources),
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": admin.email, "password": "wrong-password" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_session() {
    let resources = create_test_resources().await.unwrap();
    let (_, token) = create_admin_with_token(&resources).await.unwrap();

    // Token works before logout
    let response = send_request(
        test_router(&resources),
        Method::GET,
        "/api/users",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send_request(
        test_router(&resources),
        Method::POST,
        "/api/auth/logout",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Same token is rejected afterwards even though the JWT is unexpired
    let response = send_request(
        test_router(&resources),
        Method::GET,
        "/api/users",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_suspension_kills_live_sessions() {
    let resources = create_test_resources().await.unwrap();
    let (_, admin_token) = create_admin_with_token(&resources).await.unwrap();
    let (user, user_token) = common::create_user_with_token(&resources).await.unwrap();

    let response = send_request(
        test_router(&resources),
        Method::POST,
        &format!("/api/users/{}/suspend", user.id),
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send_request(
        test_router(&resources),
        Method::GET,
        "/api/dashboards",
        Some(&user_token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_requests_require_credentials() {
    let resources = create_test_resources().await.unwrap();

    let response = send_request(
        test_router(&resources),
        Method::GET,
        "/api/users",
        None,
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_reject_regular_users() {
    let resources = create_test_resources().await.unwrap();
    let (_, token) = common::create_user_with_token(&resources).await.unwrap();

    let response = send_request(
        test_router(&resources),
        Method::GET,
        "/api/users",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
