//! Health and service-descriptor endpoints.

use axum::{http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Response time
    pub timestamp: DateTime<Utc>,
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
}

/// `GET /health`: liveness only; does not verify store connectivity.
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
            service: "flashsale".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// `GET /`: service descriptor with the endpoint map.
pub async fn service_descriptor() -> Json<Value> {
    Json(json!({
        "service": "flashsale",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /health",
            "checkout": "POST /checkout",
            "purchase": "POST /purchase",
        },
        "status": "running",
    }))
}
