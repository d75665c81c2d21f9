//! HTTP surface of the notification service.
//!
//! Endpoints:
//! - GET  /health (liveness)
//! - GET  /api/health/report (metrics, probe results, threshold breaches)
//! - GET  /api/notifications/history
//! - POST /api/notifications/{id}/read
//! - POST /api/lifecycle/{state} (`foreground` or `background`)

pub mod routes;
pub mod state;
