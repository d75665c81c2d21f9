//! In-memory [`BackendStore`] for tests and database-less local runs.
//!
//! Every write is recorded so callers can assert on it, and the whole store can
//! be switched offline to simulate an unreachable backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::backend::BackendStore;
use crate::error::AppError;
use crate::types::{DeliveryStatus, MonitoringAlert, NotificationMetrics, NotificationPayload};

#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub id: Uuid,
    pub status: DeliveryStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    status_updates: Vec<StatusUpdate>,
    scheduled: Vec<(NotificationPayload, DateTime<Utc>)>,
    web: Vec<NotificationPayload>,
    metrics: Option<NotificationMetrics>,
    alerts: Vec<MonitoringAlert>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    offline: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a previously persisted metrics snapshot.
    pub fn with_metrics(metrics: NotificationMetrics) -> Self {
        let backend = Self::new();
        backend.tables().metrics = Some(metrics);
        backend
    }

    /// Make every subsequent call fail with a database-style error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn status_updates(&self) -> Vec<StatusUpdate> {
        self.tables().status_updates.clone()
    }

    /// Most recent status written for `id`.
    pub fn latest_status(&self, id: Uuid) -> Option<DeliveryStatus> {
        self.tables()
            .status_updates
            .iter()
            .rev()
            .find(|u| u.id == id)
            .map(|u| u.status)
    }

    pub fn scheduled_rows(&self) -> Vec<(NotificationPayload, DateTime<Utc>)> {
        self.tables().scheduled.clone()
    }

    pub fn web_rows(&self) -> Vec<NotificationPayload> {
        self.tables().web.clone()
    }

    pub fn stored_metrics(&self) -> Option<NotificationMetrics> {
        self.tables().metrics.clone()
    }

    pub fn alerts(&self) -> Vec<MonitoringAlert> {
        self.tables().alerts.clone()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_online(&self) -> Result<(), AppError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::Storage("backend unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BackendStore for MemoryBackend {
    async fn update_notification_status(
        &self,
        id: Uuid,
        status: DeliveryStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.check_online()?;
        let mut tables = self.tables();

        let current = tables.status_updates.iter().rev().find(|u| u.id == id);
        if current.is_some_and(|u| !u.status.can_transition_to(status)) {
            return Ok(());
        }

        tables.status_updates.push(StatusUpdate {
            id,
            status,
            updated_at,
        });
        Ok(())
    }

    async fn insert_scheduled_notification(
        &self,
        payload: &NotificationPayload,
        scheduled_for: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.check_online()?;
        self.tables().scheduled.push((payload.clone(), scheduled_for));
        Ok(())
    }

    async fn insert_web_notification(&self, payload: &NotificationPayload) -> Result<(), AppError> {
        self.check_online()?;
        self.tables().web.push(payload.clone());
        Ok(())
    }

    async fn load_metrics(&self) -> Result<Option<NotificationMetrics>, AppError> {
        self.check_online()?;
        Ok(self.tables().metrics.clone())
    }

    async fn upsert_metrics(&self, metrics: &NotificationMetrics) -> Result<(), AppError> {
        self.check_online()?;
        self.tables().metrics = Some(metrics.clone());
        Ok(())
    }

    async fn insert_alert(&self, alert: &MonitoringAlert) -> Result<(), AppError> {
        self.check_online()?;
        self.tables().alerts.push(alert.clone());
        Ok(())
    }

    async fn count_notifications(&self, limit: i64) -> Result<i64, AppError> {
        self.check_online()?;
        let count = self.tables().status_updates.len() as i64;
        Ok(count.min(limit))
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.check_online()
    }
}
