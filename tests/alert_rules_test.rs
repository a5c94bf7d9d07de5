// ABOUTME: Integration tests for alert rule CRUD and admin gating
// ABOUTME: Verifies validation of severity and protocol filters
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project

mod common;

use axum::http::{Method, StatusCode};
use common::{
    create_admin_with_token, create_test_resources, create_user_with_token, expect_json,
    send_request, test_router,
};
use serde_json::json;

#[tokio::test]
async fn test_alert_rule_crud_lifecycle() {
    let resources = create_test_resources().await.unwrap();
    let (_, admin_token) = create_admin_with_token(&resources).await.unwrap();

    let body = expect_json(
        send_request(
            test_router(&resources),
            Method::POST,
            "/api/alert-rules",
            Some(&admin_token),
            Some(json!({
                "name": "disk errors",
                "min_severity": 3,
                "match_substring": "disk",
                "protocol": "syslog"
            })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let rule_id = body["id"].as_str().unwrap().to_owned();
    assert_eq!(body["enabled"], true);
    assert_eq!(body["trigger_count"], 0);

    // Disable via partial update
    let body = expect_json(
        send_request(
            test_router(&resources),
            Method::PUT,
            &format!("/api/alert-rules/{rule_id}"),
            Some(&admin_token),
            Some(json!({ "enabled": false })),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(body["enabled"], false);
    assert_eq!(body["name"], "disk errors");

    let response = send_request(
        test_router(&resources),
        Method::DELETE,
        &format!("/api/alert-rules/{rule_id}"),
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let body = expect_json(
        send_request(
            test_router(&resources),
            Method::GET,
            "/api/alert-rules",
            Some(&admin_token),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(body["alert_rules"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_rule_writes_require_admin() {
    let resources = create_test_resources().await.unwrap();
    let (_, user_token) = create_user_with_token(&resources).await.unwrap();

    let response = send_request(
        test_router(&resources),
        Method::POST,
        "/api/alert-rules",
        Some(&user_token),
        Some(json!({ "name": "sneaky", "min_severity": 2 })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Reads are open to any authenticated user
    let response = send_request(
        test_router(&resources),
        Method::GET,
        "/api/alert-rules",
        Some(&user_token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rule_validation_rejects_bad_input() {
    let resources = create_test_resources().await.unwrap();
    let (_, admin_token) = create_admin_with_token(&resources).await.unwrap();

    // Severity outside the syslog scale
    let response = send_request(
        test_router(&resources),
        Method::POST,
        "/api/alert-rules",
        Some(&admin_token),
        Some(json!({ "name": "bad severity", "min_severity": 9 })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unknown protocol filter
    let response = send_request(
        test_router(&resources),
        Method::POST,
        "/api/alert-rules",
        Some(&admin_token),
        Some(json!({ "name": "bad protocol", "min_severity": 3, "protocol": "snmp" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
