// ABOUTME: Integration tests for dashboard CRUD and layout validation
// ABOUTME: Dashboards are owner-scoped; other users get not-found
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project

mod common;

use axum::http::{Method, StatusCode};
use common::{create_test_resources, create_user_with_token, expect_json, send_request, test_router};
use serde_json::json;

#[tokio::test]
async fn test_dashboard_crud_lifecycle() {
    let resources = create_test_resources().await.unwrap();
    let (_, token) = create_user_with_token(&resources).await.unwrap();

    let body = expect_json(
        send_request(
            test_router(&resources),
            Method::POST,
            "/api/dashboards",
            Some(&token),
            Some(json!({
                "name": "Ops overview",
                "layout": {
                    "columns": 12,
                    "widgets": [
                        { "id": "w1", "kind": "event_chart", "title": "Rate",
                          "col": 0, "row": 0, "width": 6, "height": 2 }
                    ]
                }
            })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let dashboard_id = body["id"].as_str().unwrap().to_owned();

    // Rename via partial update
    let body = expect_json(
        send_request(
            test_router(&resources),
            Method::PUT,
            &format!("/api/dashboards/{dashboard_id}"),
            Some(&token),
            Some(json!({ "name": "Ops overview v2" })),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(body["name"], "Ops overview v2");
    assert_eq!(body["layout"]["widgets"][0]["id"], "w1");

    // Delete removes it from the listing
    let response = send_request(
        test_router(&resources),
        Method::DELETE,
        &format!("/api/dashboards/{dashboard_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let body = expect_json(
        send_request(
            test_router(&resources),
            Method::GET,
            "/api/dashboards",
            Some(&token),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(body["dashboards"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_overflowing_layout_is_rejected() {
    let resources = create_test_resources().await.unwrap();
    let (_, token) = create_user_with_token(&resources).await.unwrap();

    let response = send_request(
        test_router(&resources),
        Method::POST,
        "/api/dashboards",
        Some(&token),
        Some(json!({
            "name": "Broken",
            "layout": {
                "columns": 12,
                "widgets": [
                    { "id": "w1", "kind": "severity_breakdown", "title": "Wide",
                      "col": 8, "row": 0, "width": 6, "height": 2 }
                ]
            }
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_layout_with_huge_placement_is_rejected() {
    let resources = create_test_resources().await.unwrap();
    let (_, token) = create_user_with_token(&resources).await.unwrap();

    // col + width would wrap around u32; must be rejected, not accepted
    let response = send_request(
        test_router(&resources),
        Method::POST,
        "/api/dashboards",
        Some(&token),
        Some(json!({
            "name": "Broken",
            "layout": {
                "columns": 12,
                "widgets": [
                    { "id": "w1", "kind": "counter", "title": "Wrap",
                      "col": 4_294_967_295_u32, "row": 0, "width": 2, "height": 1 }
                ]
            }
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_widget_ids_are_rejected() {
    let resources = create_test_resources().await.unwrap();
    let (_, token) = create_user_with_token(&resources).await.unwrap();

    let response = send_request(
        test_router(&resources),
        Method::POST,
        "/api/dashboards",
        Some(&token),
        Some(json!({
            "name": "Broken",
            "layout": {
                "columns": 12,
                "widgets": [
                    { "id": "w1", "kind": "event_chart", "title": "A",
                      "col": 0, "row": 0, "width": 4, "height": 2 },
                    { "id": "w1", "kind": "event_chart", "title": "B",
                      "col": 4, "row": 0, "width": 4, "height": 2 }
                ]
            }
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dashboards_are_owner_scoped() {
    let resources = create_test_resources().await.unwrap();
    let (_, owner_token) = create_user_with_token(&resources).await.unwrap();
    let (_, other_token) = create_user_with_token(&resources).await.unwrap();

    let body = expect_json(
        send_request(
            test_router(&resources),
            Method::POST,
            "/api/dashboards",
            Some(&owner_token),
            Some(json!({ "name": "Private" })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let dashboard_id = body["id"].as_str().unwrap().to_owned();

    // A different user cannot see or modify it
    let response = send_request(
        test_router(&resources),
        Method::GET,
        &format!("/api/dashboards/{dashboard_id}"),
        Some(&other_token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send_request(
        test_router(&resources),
        Method::DELETE,
        &format!("/api/dashboards/{dashboard_id}"),
        Some(&other_token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
