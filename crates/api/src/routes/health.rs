//! Liveness and health report endpoints.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use herald_monitor::HealthReport;

use crate::state::ApiState;

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/health/report", get(health_report))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "herald",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /api/health/report. Current metrics plus a fresh health check.
async fn health_report(State(state): State<ApiState>) -> Json<HealthReport> {
    Json(state.service.monitor().generate_health_report().await)
}
