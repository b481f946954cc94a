use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

pub mod forwarding;
pub mod health;
pub mod rules;
pub mod webhook;

/// API information for the root endpoint
pub async fn api_info() -> impl IntoResponse {
    Json(json!({
        "service": "leadrelay",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "ingestion": "POST /webhook/{webhook_id}",
            "routing_rules": "/api/v1/scopes/{scope}/routing-rules",
            "forwarding_rules": "/api/v1/scopes/{scope}/forwarding-rules",
            "forwarding_toggle": "PATCH /api/v1/scopes/{scope}/forwarding-toggle",
            "forwarding_log": "GET /api/v1/scopes/{scope}/forwarding-log",
            "forwarding_stats": "GET /api/v1/scopes/{scope}/forwarding-stats",
        },
    }))
}

/// Fallback handler for unknown routes
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": {
                "code": "NOT_FOUND",
                "message": "Route not found",
            }
        })),
    )
}
