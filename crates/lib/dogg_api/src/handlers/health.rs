//! Liveness and security posture endpoints.

use axum::Json;
use axum::extract::State;
use chrono::Utc;

use crate::AppState;
use crate::models::{HealthResponse, SecurityStatusResponse};

/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /api/security/status`
pub async fn security_status_handler(State(state): State<AppState>) -> Json<SecurityStatusResponse> {
    let rate_limit = if state.limiters.general.is_enabled() {
        "active"
    } else {
        "disabled"
    };
    Json(SecurityStatusResponse {
        security: "enabled",
        rate_limit,
        authentication: "required",
        timestamp: Utc::now(),
    })
}
