// ABOUTME: Integration tests for API key creation, listing, revocation, and key auth
// ABOUTME: Verifies the full key value is visible exactly once, at creation
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project

mod common;

use axum::http::{Method, StatusCode};
use common::{create_test_resources, create_user_with_token, expect_json, send_request, test_router};
use serde_json::json;

#[tokio::test]
async fn test_create_key_shows_full_value_once() {
    let resources = create_test_resources().await.unwrap();
    let (_, token) = create_user_with_token(&resources).await.unwrap();

    let body = expect_json(
        send_request(
            test_router(&resources),
            Method::POST,
            "/api/api-keys",
            Some(&token),
            Some(json!({ "name": "ci pipeline", "rate_limit_requests": 50_000 })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;

    let full_key = body["api_key"].as_str().unwrap();
    assert!(full_key.starts_with("lh_live_"));
    assert_eq!(body["key"]["tier"], "professional");
    // The summary exposes only the display prefix
    let prefix = body["key"]["key_prefix"].as_str().unwrap();
    assert_eq!(prefix.len(), 12);
    assert!(full_key.starts_with(prefix));

    // Listing never returns the full value again
    let body = expect_json(
        send_request(
            test_router(&resources),
            Method::GET,
            "/api/api-keys",
            Some(&token),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    let listed = &body["api_keys"][0];
    assert_eq!(listed["name"], "ci pipeline");
    assert!(listed.get("api_key").is_none());
    assert!(listed.get("key_hash").is_none());
}

#[tokio::test]
async fn test_trial_keys_get_trial_prefix_and_expiry() {
    let resources = create_test_resources().await.unwrap();
    let (_, token) = create_user_with_token(&resources).await.unwrap();

    let body = expect_json(
        send_request(
            test_router(&resources),
            Method::POST,
            "/api/api-keys",
            Some(&token),
            Some(json!({ "name": "evaluation", "rate_limit_requests": 500 })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;

    assert!(body["api_key"].as_str().unwrap().starts_with("lh_trial_"));
    assert_eq!(body["key"]["tier"], "trial");
    assert!(body["key"]["expires_at"].as_str().is_some());
}

#[tokio::test]
async fn test_api_key_authenticates_requests() {
    let resources = create_test_resources().await.unwrap();
    let (_, token) = create_user_with_token(&resources).await.unwrap();

    let body = expect_json(
        send_request(
            test_router(&resources),
            Method::POST,
            "/api/api-keys",
            Some(&token),
            Some(json!({ "name": "automation", "rate_limit_requests": 50_000 })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let full_key = body["api_key"].as_str().unwrap().to_owned();

    // The key itself is a valid credential
    let response = send_request(
        test_router(&resources),
        Method::GET,
        "/api/dashboards",
        Some(&full_key),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_deactivated_key_is_rejected() {
    let resources = create_test_resources().await.unwrap();
    let (_, token) = create_user_with_token(&resources).await.unwrap();

    let body = expect_json(
        send_request(
            test_router(&resources),
            Method::POST,
            "/api/api-keys",
            Some(&token),
            Some(json!({ "name": "short lived", "rate_limit_requests": 50_000 })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let full_key = body["api_key"].as_str().unwrap().to_owned();
    let key_id = body["key"]["id"].as_str().unwrap().to_owned();

    let response = send_request(
        test_router(&resources),
        Method::DELETE,
        &format!("/api/api-keys/{key_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send_request(
        test_router(&resources),
        Method::GET,
        "/api/dashboards",
        Some(&full_key),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_usage_endpoint_reports_rate_limit() {
    let resources = create_test_resources().await.unwrap();
    let (_, token) = create_user_with_token(&resources).await.unwrap();

    let body = expect_json(
        send_request(
            test_router(&resources),
            Method::POST,
            "/api/api-keys",
            Some(&token),
            Some(json!({ "name": "metered", "rate_limit_requests": 5000 })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let full_key = body["api_key"].as_str().unwrap().to_owned();
    let key_id = body["key"]["id"].as_str().unwrap().to_owned();

    // One authenticated call records one usage row
    let response = send_request(
        test_router(&resources),
        Method::GET,
        "/api/dashboards",
        Some(&full_key),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = expect_json(
        send_request(
            test_router(&resources),
            Method::GET,
            &format!("/api/api-keys/{key_id}/usage"),
            Some(&token),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(body["rate_limit"]["limit"], 5000);
    assert_eq!(body["rate_limit"]["remaining"], 4999);
    assert_eq!(body["rate_limit"]["is_rate_limited"], false);
}

#[tokio::test]
async fn test_rate_limits_overview_lists_active_keys() {
    let resources = create_test_resources().await.unwrap();
    let (_, token) = create_user_with_token(&resources).await.unwrap();

    for name in ["first", "second"] {
        let response = send_request(
            test_router(&resources),
            Method::POST,
            "/api/api-keys",
            Some(&token),
            Some(json!({ "name": name, "rate_limit_requests": 50_000 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let body = expect_json(
        send_request(
            test_router(&resources),
            Method::GET,
            "/api/rate-limits",
            Some(&token),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["rate_limits"][0]["tier"], "professional");
}
