//! Backend relational store used by the notification pipeline.
//!
//! The dispatcher, monitor and cache only depend on the [`BackendStore`] trait;
//! [`PgBackend`] is the PostgreSQL implementation and
//! [`MemoryBackend`](crate::memory::MemoryBackend) backs tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::error::AppError;
use crate::types::{DeliveryStatus, MonitoringAlert, NotificationMetrics, NotificationPayload};

/// Row id of the single metrics snapshot in `monitoring_metrics`.
const METRICS_SNAPSHOT_ID: &str = "current";

#[async_trait]
pub trait BackendStore: Send + Sync {
    /// Persist a delivery status on the `notifications` row.
    ///
    /// A row whose current status cannot move to `status` is left unchanged.
    async fn update_notification_status(
        &self,
        id: Uuid,
        status: DeliveryStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Store a notification for later delivery (status `pending`).
    async fn insert_scheduled_notification(
        &self,
        payload: &NotificationPayload,
        scheduled_for: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Store an in-app (web) notification.
    async fn insert_web_notification(&self, payload: &NotificationPayload) -> Result<(), AppError>;

    /// Load the last persisted metrics snapshot, if any.
    async fn load_metrics(&self) -> Result<Option<NotificationMetrics>, AppError>;

    /// Upsert the full metrics snapshot.
    async fn upsert_metrics(&self, metrics: &NotificationMetrics) -> Result<(), AppError>;

    async fn insert_alert(&self, alert: &MonitoringAlert) -> Result<(), AppError>;

    /// Bounded count over `notifications`, used to validate administrative access.
    async fn count_notifications(&self, limit: i64) -> Result<i64, AppError>;

    /// Lightweight liveness call.
    async fn ping(&self) -> Result<(), AppError>;
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BackendStore for PgBackend {
    async fn update_notification_status(
        &self,
        id: Uuid,
        status: DeliveryStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let from: Vec<String> = status.predecessors().iter().map(|s| s.to_string()).collect();

        let result = sqlx::query(
            r#"
            UPDATE notifications SET status = $2, updated_at = $3
            WHERE id = $1 AND status = ANY($4)
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(updated_at)
        .bind(&from)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(
                notification_id = %id,
                %status,
                "Status update matched no row at an earlier status"
            );
        }

        Ok(())
    }

    async fn insert_scheduled_notification(
        &self,
        payload: &NotificationPayload,
        scheduled_for: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_notifications (id, notification, scheduled_for, status)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(Json(payload))
        .bind(scheduled_for)
        .bind(DeliveryStatus::Pending.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_web_notification(&self, payload: &NotificationPayload) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO web_notifications (id, title, body, data, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&payload.title)
        .bind(&payload.body)
        .bind(Json(&payload.data))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_metrics(&self) -> Result<Option<NotificationMetrics>, AppError> {
        let row: Option<(Json<NotificationMetrics>,)> =
            sqlx::query_as("SELECT metrics FROM monitoring_metrics WHERE id = $1")
                .bind(METRICS_SNAPSHOT_ID)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(Json(metrics),)| metrics))
    }

    async fn upsert_metrics(&self, metrics: &NotificationMetrics) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO monitoring_metrics (id, metrics, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (id) DO UPDATE SET metrics = EXCLUDED.metrics, updated_at = NOW()
            "#,
        )
        .bind(METRICS_SNAPSHOT_ID)
        .bind(Json(metrics))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_alert(&self, alert: &MonitoringAlert) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO monitoring_alerts (type, component, message, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&alert.alert_type)
        .bind(&alert.component)
        .bind(&alert.message)
        .bind(alert.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_notifications(&self, limit: i64) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM (SELECT 1 FROM notifications LIMIT $1) AS sample")
                .bind(limit)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
