//! Integration tests for API routes.
//!
//! Uses `tower::ServiceExt` to test Axum routes without a real HTTP server,
//! over the in-memory backend and a temporary cache directory.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use herald_api::routes::create_router;
use herald_api::state::ApiState;
use herald_cache::FileStore;
use herald_common::error::AppError;
use herald_common::memory::MemoryBackend;
use herald_common::retry::TimeoutPolicy;
use herald_common::token::StaticTokenSource;
use herald_common::types::{
    DeliveryStatus, NotificationEvent, NotificationPayload, NotificationType, StoredNotification,
};
use herald_engine::{NotificationService, ServiceConfig, ServiceDeps};
use herald_monitor::{HealthProbe, HealthProbes};
use herald_notifier::{ChangeFeed, PushClient};

// ============================================================
// Helpers
// ============================================================

struct FixedProbe(bool);

#[async_trait]
impl HealthProbe for FixedProbe {
    async fn check(&self) -> bool {
        self.0
    }
}

/// Routes never start the dispatcher, so the feed is never subscribed.
struct IdleFeed;

#[async_trait]
impl ChangeFeed for IdleFeed {
    async fn subscribe(&self) -> Result<mpsc::Receiver<NotificationEvent>, AppError> {
        Err(AppError::Internal("no change feed in API tests".to_string()))
    }
}

struct TestApp {
    _dir: tempfile::TempDir,
    service: Arc<NotificationService>,
    backend: Arc<MemoryBackend>,
}

fn build_app(backend_probe_up: bool) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(MemoryBackend::new());

    let service = Arc::new(NotificationService::new(
        ServiceDeps {
            backend: backend.clone(),
            store: Arc::new(FileStore::new(dir.path())),
            tokens: Arc::new(StaticTokenSource::new(Some("device-1".to_string()))),
            feed: Arc::new(IdleFeed),
            push: PushClient::new("http://127.0.0.1:9", "access-token", TimeoutPolicy::default()),
            probes: HealthProbes {
                push_provider: Arc::new(FixedProbe(true)),
                admin_sync: Arc::new(FixedProbe(true)),
                backend: Arc::new(FixedProbe(backend_probe_up)),
            },
        },
        ServiceConfig::default(),
    ));

    TestApp {
        _dir: dir,
        service,
        backend,
    }
}

fn router(app: &TestApp) -> axum::Router {
    create_router(ApiState::new(app.service.clone()))
}

async fn send(app: &TestApp, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = router(app)
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn delivered(id: Uuid) -> StoredNotification {
    StoredNotification::new(
        id,
        NotificationPayload {
            kind: NotificationType::ArticleLink,
            title: "Match report".to_string(),
            body: "Late winner settles the derby".to_string(),
            deep_link: Some("newsapp://articles/778".to_string()),
            data: Default::default(),
        },
        DeliveryStatus::Delivered,
    )
}

// ============================================================
// Route tests
// ============================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_app(true);
    let (status, json) = send(&app, "GET", "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "herald");
}

#[tokio::test]
async fn test_health_report_reflects_probes() {
    let app = build_app(false);
    let (status, json) = send(&app, "GET", "/api/health/report").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["health"]["status"], "degraded");
    assert_eq!(json["health"]["details"]["backend"], false);
    assert_eq!(json["metrics"]["delivery_stats"]["total_sent"], 0);
    assert!(json["threshold_breaches"].as_array().unwrap().is_empty());
    assert_eq!(app.backend.alerts().len(), 1);
}

#[tokio::test]
async fn test_history_and_mark_read() {
    let app = build_app(true);
    let id = Uuid::new_v4();
    app.service.cache().add_to_history(delivered(id)).await;

    let (status, json) = send(&app, "GET", "/api/notifications/history").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["entries"].as_array().unwrap().len(), 1);

    let (status, json) = send(&app, "POST", &format!("/api/notifications/{}/read", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "read");

    // marking again is harmless
    let (status, json) = send(&app, "POST", &format!("/api/notifications/{}/read", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "read");
}

#[tokio::test]
async fn test_mark_read_unknown_is_not_found() {
    let app = build_app(true);
    let (status, json) = send(
        &app,
        "POST",
        &format!("/api/notifications/{}/read", Uuid::new_v4()),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_lifecycle_transitions() {
    let app = build_app(true);

    let (status, json) = send(&app, "POST", "/api/lifecycle/foreground").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "foreground");
    let metrics = app.service.monitor().metrics().await;
    assert_eq!(metrics.token_health.refresh_success, 1);
    assert_eq!(metrics.sync_status.total_syncs, 1);

    let (status, _) = send(&app, "POST", "/api/lifecycle/background").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "POST", "/api/lifecycle/hibernating").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
