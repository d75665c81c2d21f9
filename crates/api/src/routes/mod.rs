pub mod health;
pub mod lifecycle;
pub mod notifications;

use axum::Router;

use crate::state::ApiState;

/// Build the complete API router with all routes.
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(notifications::router())
        .merge(lifecycle::router())
        .with_state(state)
}
