//! App lifecycle transitions.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use herald_common::error::AppError;
use herald_engine::AppState;

use crate::state::ApiState;

pub fn router() -> Router<ApiState> {
    Router::new().route("/api/lifecycle/{state}", post(transition))
}

/// POST /api/lifecycle/:state
async fn transition(
    State(state): State<ApiState>,
    Path(raw): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let app_state: AppState = raw.parse()?;
    state.service.lifecycle().handle_transition(app_state).await;
    Ok(Json(json!({ "state": app_state })))
}
