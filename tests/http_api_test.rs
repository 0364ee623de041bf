//! HTTP surface tests over the in-memory stores.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

mod support;

use flashsale::server::{build_router, AppState};
use flashsale::stores::{InMemoryCounterStore, InMemoryRecordStore};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use support::harness;
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_and_descriptor_respond() {
    let h = harness(10_000, 10);
    let app = build_router(AppState::new(h.config.clone(), h.services.clone()));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "flashsale");

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["endpoints"]["checkout"], "POST /checkout");
}

#[tokio::test]
async fn checkout_then_purchase_over_http() {
    let h = harness(10_000, 10);
    h.services.sales.create_hourly_sale().await.unwrap();
    let app = build_router(AppState::new(h.config.clone(), h.services.clone()));

    let response = app
        .clone()
        .oneshot(json_request(
            "/checkout",
            serde_json::json!({"user_id": "u1", "item_id": "item_a"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    let code = body["checkout_code"].as_str().unwrap().to_string();
    assert!(code.starts_with("CHK_"));
    assert!(body["expires_at"].is_string());
    assert_eq!(body["item"]["id"], "item_a");

    let response = app
        .clone()
        .oneshot(json_request(
            "/purchase",
            serde_json::json!({"checkout_code": code}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["user_purchases"], 1);
    assert!(body["purchase_id"].as_i64().unwrap() > 0);

    // Replaying the code answers 400 ALREADY_USED.
    let response = app
        .oneshot(json_request(
            "/purchase",
            serde_json::json!({"checkout_code": code}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "ALREADY_USED");
}

#[tokio::test]
async fn query_parameters_are_accepted() {
    let h = harness(10_000, 10);
    h.services.sales.create_hourly_sale().await.unwrap();
    let app = build_router(AppState::new(h.config.clone(), h.services.clone()));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/checkout?user_id=u1&item_id=item_a")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn validation_failures_answer_bad_request() {
    let h = harness(10_000, 10);
    h.services.sales.create_hourly_sale().await.unwrap();
    let app = build_router(AppState::new(h.config.clone(), h.services.clone()));

    let response = app
        .clone()
        .oneshot(json_request(
            "/checkout",
            serde_json::json!({"user_id": "", "item_id": "item_a"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "INVALID_INPUT");

    let response = app
        .oneshot(json_request(
            "/checkout",
            serde_json::json!({"user_id": "u1", "item_id": "x"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn capacity_rejections_answer_conflict() {
    let h = harness(1, 1);
    h.services.sales.create_hourly_sale().await.unwrap();
    let app = build_router(AppState::new(h.config.clone(), h.services.clone()));

    // Consume the single item.
    let grant = h.services.checkout.checkout("u1", "item_a").await.unwrap();
    h.services.purchase.purchase(&grant.code).await.unwrap();

    let grant = h.services.checkout.checkout("u2", "item_a").await.unwrap();
    let response = app
        .oneshot(json_request(
            "/purchase",
            serde_json::json!({"checkout_code": grant.code}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["code"], "SOLD_OUT");
}

#[tokio::test]
async fn user_limit_includes_the_current_count() {
    let h = harness(10_000, 1);
    h.services.sales.create_hourly_sale().await.unwrap();
    let app = build_router(AppState::new(h.config.clone(), h.services.clone()));

    let grant = h.services.checkout.checkout("u1", "item_a").await.unwrap();
    h.services.purchase.purchase(&grant.code).await.unwrap();

    let grant = h.services.checkout.checkout("u1", "item_a").await.unwrap();
    let response = app
        .oneshot(json_request(
            "/purchase",
            serde_json::json!({"checkout_code": grant.code}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["code"], "USER_LIMIT_EXCEEDED");
    assert_eq!(body["user_purchases"], 1);
}

#[tokio::test]
async fn degraded_server_answers_service_unavailable() {
    let h = harness(10_000, 10);
    let state =
        AppState::<InMemoryCounterStore, InMemoryRecordStore>::degraded(Arc::clone(&h.config));
    let app = build_router(state);

    // Health stays up while store-backed endpoints shed load.
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(json_request(
            "/checkout",
            serde_json::json!({"user_id": "u1", "item_id": "item_a"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
}
