//! Liveness check.

use axum::Json;
use chrono::Utc;

use crate::models::HealthResponse;

/// `GET /ping`
pub async fn ping() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        ts: Utc::now(),
        version: optimus_core::version().to_string(),
    })
}
