//! Shared application state for the Axum API server.

use std::sync::Arc;

use herald_engine::NotificationService;

/// State shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<NotificationService>,
}

impl ApiState {
    pub fn new(service: Arc<NotificationService>) -> Self {
        Self { service }
    }
}
