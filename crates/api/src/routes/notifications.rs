//! Local notification history routes.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use herald_cache::NotificationHistory;
use herald_common::error::AppError;
use herald_common::types::StoredNotification;

use crate::state::ApiState;

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/api/notifications/history", get(history))
        .route("/api/notifications/{id}/read", post(mark_read))
}

async fn history(State(state): State<ApiState>) -> Json<NotificationHistory> {
    Json(state.service.cache().get_notification_history().await)
}

/// POST /api/notifications/:id/read. Mark a delivered notification as read.
async fn mark_read(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StoredNotification>, AppError> {
    let notification = state.service.cache().mark_read(id).await?;
    tracing::info!(notification_id = %id, "Notification marked read");
    Ok(Json(notification))
}
