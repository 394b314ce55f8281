use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServiceHealth,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub store: String,
    pub ai_service: String,
}

/// Health check endpoint - public
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let store_result = state.store.ping().await;

    // The AI service is optional; absent config reports as disabled, not
    // unhealthy.
    let ai_status = match &state.ai_client {
        Some(client) => {
            if client.health_check().await.is_ok() {
                "ok"
            } else {
                "error"
            }
        }
        None => "disabled",
    };

    let store_status = if store_result.is_ok() { "ok" } else { "error" };

    // The store is critical, the AI service only degrades.
    let status = if store_result.is_err() {
        "unhealthy"
    } else if ai_status == "error" {
        "degraded"
    } else {
        "healthy"
    };

    let status_code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            services: ServiceHealth {
                store: store_status.to_string(),
                ai_service: ai_status.to_string(),
            },
        }),
    )
}
