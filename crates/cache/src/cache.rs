//! Local notification cache.
//!
//! Holds the set of notifications whose latest status has not yet reached the
//! backend, and a most-recent-first history log capped at [`HISTORY_LIMIT`].
//! A separate [`IN_FLIGHT_KEY`] blob keeps the dispatcher's retry queue across
//! restarts. Every mutation rewrites the whole blob for its key.
//!
//! Storage failures are logged and the cache keeps working from memory, with
//! the exception of [`LocalNotificationCache::clear_all`], which reports them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use herald_common::backend::BackendStore;
use herald_common::error::AppError;
use herald_common::types::{DeliveryStatus, StoredNotification};

use crate::store::KeyValueStore;

pub const PENDING_KEY: &str = "@notifications";
pub const HISTORY_KEY: &str = "@notification_history";
pub const LAST_SYNC_KEY: &str = "@last_sync_time";
pub const IN_FLIGHT_KEY: &str = "@in_flight";

/// Maximum number of history entries kept.
pub const HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct NotificationHistory {
    pub entries: Vec<StoredNotification>,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Result of one cache → backend sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub synced: usize,
    pub failed: usize,
    pub remaining: usize,
}

pub struct LocalNotificationCache {
    store: Arc<dyn KeyValueStore>,
    backend: Arc<dyn BackendStore>,
    pending: Mutex<HashMap<Uuid, StoredNotification>>,
    /// Serializes read-modify-write cycles on the history blob.
    history_lock: Mutex<()>,
}

impl LocalNotificationCache {
    pub fn new(store: Arc<dyn KeyValueStore>, backend: Arc<dyn BackendStore>) -> Self {
        Self {
            store,
            backend,
            pending: Mutex::new(HashMap::new()),
            history_lock: Mutex::new(()),
        }
    }

    /// Load the persisted pending set into memory.
    pub async fn initialize(&self) {
        let loaded = match self.read_json::<HashMap<Uuid, StoredNotification>>(PENDING_KEY).await {
            Ok(map) => map.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load pending notifications, starting empty");
                HashMap::new()
            }
        };

        let count = loaded.len();
        *self.pending.lock().await = loaded;
        tracing::info!(pending = count, "Local notification cache initialized");
    }

    pub async fn cache_notification(&self, notification: StoredNotification) {
        self.cache_notifications([notification]).await;
    }

    /// Cache several notifications with a single blob rewrite.
    ///
    /// An already cached id keeps its entry when the incoming status would
    /// move it backwards.
    pub async fn cache_notifications(&self, notifications: impl IntoIterator<Item = StoredNotification>) {
        let mut pending = self.pending.lock().await;
        for notification in notifications {
            if let Some(existing) = pending.get(&notification.id)
                && !existing.status.can_transition_to(notification.status)
            {
                tracing::warn!(
                    notification_id = %notification.id,
                    from = %existing.status,
                    to = %notification.status,
                    "Kept cached notification over backward status"
                );
                continue;
            }
            pending.insert(notification.id, notification);
        }
        self.persist_logged(&pending).await;
    }

    /// Cache `notification` if its id is unknown, otherwise advance the cached
    /// entry to its status and timestamp.
    ///
    /// Returns `false` when the cached entry cannot move to that status.
    pub async fn upsert_status(&self, notification: StoredNotification) -> bool {
        let mut pending = self.pending.lock().await;

        match pending.get_mut(&notification.id) {
            Some(entry) if !entry.status.can_transition_to(notification.status) => {
                tracing::warn!(
                    notification_id = %notification.id,
                    from = %entry.status,
                    to = %notification.status,
                    "Rejected backward status transition"
                );
                return false;
            }
            Some(entry) => {
                entry.status = notification.status;
                entry.timestamp = notification.timestamp;
            }
            None => {
                pending.insert(notification.id, notification);
            }
        }

        self.persist_logged(&pending).await;
        true
    }

    /// Move a cached notification to `status`, refreshing its timestamp.
    ///
    /// Returns `false` when the id is not cached or the move would go backwards.
    pub async fn update_delivery_status(&self, id: Uuid, status: DeliveryStatus) -> bool {
        let mut pending = self.pending.lock().await;

        let Some(entry) = pending.get_mut(&id) else {
            tracing::debug!(notification_id = %id, %status, "Status update for uncached notification");
            return false;
        };

        if !entry.status.can_transition_to(status) {
            tracing::warn!(
                notification_id = %id,
                from = %entry.status,
                to = %status,
                "Rejected backward status transition"
            );
            return false;
        }

        entry.status = status;
        entry.timestamp = Utc::now();
        self.persist_logged(&pending).await;
        true
    }

    /// Push every cached status to the backend.
    ///
    /// Entries whose write succeeds leave the pending set unless they changed
    /// during the pass. Failed writes are retried on the next pass.
    pub async fn sync_with_backend(&self) -> SyncOutcome {
        let snapshot: Vec<StoredNotification> = self.pending.lock().await.values().cloned().collect();
        let mut outcome = SyncOutcome::default();
        let mut settled = Vec::new();

        for entry in &snapshot {
            match self
                .backend
                .update_notification_status(entry.id, entry.status, entry.timestamp)
                .await
            {
                Ok(()) => {
                    outcome.synced += 1;
                    settled.push((entry.id, entry.status));
                }
                Err(e) => {
                    outcome.failed += 1;
                    tracing::warn!(notification_id = %entry.id, error = %e, "Failed to sync notification status");
                }
            }
        }

        let mut pending = self.pending.lock().await;
        for (id, synced_status) in settled {
            // keep entries that moved on while we were syncing
            if pending.get(&id).is_some_and(|e| e.status == synced_status) {
                pending.remove(&id);
            }
        }
        outcome.remaining = pending.len();
        self.persist_logged(&pending).await;
        drop(pending);

        if let Err(e) = self.store.set(LAST_SYNC_KEY, &Utc::now().to_rfc3339()).await {
            tracing::warn!(error = %e, "Failed to record last sync time");
        }

        tracing::debug!(
            synced = outcome.synced,
            failed = outcome.failed,
            remaining = outcome.remaining,
            "Local cache synced with backend"
        );
        outcome
    }

    pub async fn get_notification_history(&self) -> NotificationHistory {
        let entries = self.load_history().await;
        let last_sync = match self.store.get(LAST_SYNC_KEY).await {
            Ok(Some(raw)) => DateTime::parse_from_rfc3339(raw.trim())
                .map(|t| t.with_timezone(&Utc))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read last sync time");
                None
            }
        };

        NotificationHistory { entries, last_sync }
    }

    /// Prepend to the history, keeping the [`HISTORY_LIMIT`] most recent entries.
    pub async fn add_to_history(&self, notification: StoredNotification) {
        let _guard = self.history_lock.lock().await;
        let mut history = self.load_history().await;
        history.insert(0, notification);
        history.truncate(HISTORY_LIMIT);
        self.save_history(&history).await;
    }

    /// Drop history entries strictly older than `cutoff`. Returns how many were removed.
    pub async fn prune_old_notifications(&self, cutoff: DateTime<Utc>) -> usize {
        let _guard = self.history_lock.lock().await;
        let mut history = self.load_history().await;
        let before = history.len();
        history.retain(|n| n.timestamp >= cutoff);
        let removed = before - history.len();

        if removed > 0 {
            self.save_history(&history).await;
            tracing::info!(removed, "Pruned old notifications from history");
        }
        removed
    }

    /// Mark a notification as read by the user.
    ///
    /// Updates the history entry and queues the `read` status for the next sync.
    pub async fn mark_read(&self, id: Uuid) -> Result<StoredNotification, AppError> {
        let _guard = self.history_lock.lock().await;
        let mut history = self.load_history().await;
        let mut pending = self.pending.lock().await;

        let current = history
            .iter()
            .find(|n| n.id == id)
            .or_else(|| pending.get(&id))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))?;

        if !current.status.can_transition_to(DeliveryStatus::Read) {
            return Err(AppError::Validation(format!(
                "Notification {} cannot be marked read from status {}",
                id, current.status
            )));
        }

        let now = Utc::now();
        let read = StoredNotification {
            status: DeliveryStatus::Read,
            timestamp: now,
            ..current
        };

        for entry in history.iter_mut().filter(|n| n.id == id) {
            entry.status = DeliveryStatus::Read;
            entry.timestamp = now;
        }
        pending.insert(id, read.clone());

        self.persist_logged(&pending).await;
        drop(pending);
        self.save_history(&history).await;

        Ok(read)
    }

    /// Snapshot of the pending set.
    pub async fn pending(&self) -> Vec<StoredNotification> {
        self.pending.lock().await.values().cloned().collect()
    }

    /// Flush the pending set to storage, reporting failures.
    pub async fn persist(&self) -> Result<(), AppError> {
        let pending = self.pending.lock().await;
        self.write_json(PENDING_KEY, &*pending).await
    }

    /// Replace the persisted in-flight set.
    pub async fn save_in_flight(&self, entries: &[StoredNotification]) -> Result<(), AppError> {
        self.write_json(IN_FLIGHT_KEY, entries).await
    }

    /// Entries written by the last [`save_in_flight`](Self::save_in_flight).
    pub async fn load_in_flight(&self) -> Vec<StoredNotification> {
        match self.read_json::<Vec<StoredNotification>>(IN_FLIGHT_KEY).await {
            Ok(entries) => entries.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load in-flight notifications");
                Vec::new()
            }
        }
    }

    /// Remove every persisted key and empty the pending set.
    pub async fn clear_all(&self) -> Result<(), AppError> {
        let mut pending = self.pending.lock().await;
        for key in [PENDING_KEY, HISTORY_KEY, LAST_SYNC_KEY, IN_FLIGHT_KEY] {
            self.store.remove(key).await?;
        }
        pending.clear();

        tracing::info!("Local notification cache cleared");
        Ok(())
    }

    async fn persist_logged(&self, pending: &HashMap<Uuid, StoredNotification>) {
        if let Err(e) = self.write_json(PENDING_KEY, pending).await {
            tracing::warn!(error = %e, "Failed to persist pending notifications");
        }
    }

    async fn load_history(&self) -> Vec<StoredNotification> {
        match self.read_json::<Vec<StoredNotification>>(HISTORY_KEY).await {
            Ok(history) => history.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load notification history");
                Vec::new()
            }
        }
    }

    async fn save_history(&self, history: &[StoredNotification]) {
        if let Err(e) = self.write_json(HISTORY_KEY, history).await {
            tracing::warn!(error = %e, "Failed to persist notification history");
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        match self.store.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), AppError> {
        let raw = serde_json::to_string(value)?;
        self.store.set(key, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use herald_common::memory::MemoryBackend;
    use herald_common::types::{NotificationPayload, NotificationType};

    use super::*;
    use crate::store::FileStore;

    fn payload() -> NotificationPayload {
        NotificationPayload {
            kind: NotificationType::Push,
            title: "Morning briefing".to_string(),
            body: "Five stories to start your day".to_string(),
            deep_link: None,
            data: Default::default(),
        }
    }

    fn setup(dir: &std::path::Path) -> (LocalNotificationCache, Arc<FileStore>, Arc<MemoryBackend>) {
        let store = Arc::new(FileStore::new(dir));
        let backend = Arc::new(MemoryBackend::new());
        let cache = LocalNotificationCache::new(store.clone(), backend.clone());
        (cache, store, backend)
    }

    #[tokio::test]
    async fn test_backward_transition_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _, _) = setup(dir.path());
        let n = StoredNotification::new(Uuid::new_v4(), payload(), DeliveryStatus::Failed);
        cache.cache_notification(n.clone()).await;

        assert!(!cache.update_delivery_status(n.id, DeliveryStatus::Delivered).await);
        assert!(!cache.update_delivery_status(Uuid::new_v4(), DeliveryStatus::Sent).await);
    }

    #[tokio::test]
    async fn test_recaching_never_moves_status_backwards() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _, _) = setup(dir.path());
        let id = Uuid::new_v4();
        cache
            .cache_notification(StoredNotification::new(id, payload(), DeliveryStatus::Delivered))
            .await;

        cache
            .cache_notification(StoredNotification::new(id, payload(), DeliveryStatus::Pending))
            .await;

        let pending = cache.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, DeliveryStatus::Delivered);
    }

    #[tokio::test]
    async fn test_in_flight_set_is_replaced_and_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let first = StoredNotification::new(Uuid::new_v4(), payload(), DeliveryStatus::Pending);
        let second = StoredNotification::new(Uuid::new_v4(), payload(), DeliveryStatus::Pending);
        {
            let (cache, _, _) = setup(dir.path());
            cache.save_in_flight(&[first.clone(), second.clone()]).await.unwrap();
            cache.save_in_flight(&[second.clone()]).await.unwrap();
        }

        let (cache, _, _) = setup(dir.path());
        let loaded = cache.load_in_flight().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, second.id);
        // separate from the sync set
        assert!(cache.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_initialize_reloads_pending_set() {
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        {
            let (cache, _, _) = setup(dir.path());
            cache
                .cache_notification(StoredNotification::new(id, payload(), DeliveryStatus::Pending))
                .await;
        }

        let (cache, _, _) = setup(dir.path());
        assert!(cache.pending().await.is_empty());
        cache.initialize().await;
        let pending = cache.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
    }

    #[tokio::test]
    async fn test_corrupt_blob_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, store, _) = setup(dir.path());
        store.set(PENDING_KEY, "not json").await.unwrap();

        cache.initialize().await;
        assert!(cache.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_mark_read_requires_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _, _) = setup(dir.path());

        let delivered = StoredNotification::new(Uuid::new_v4(), payload(), DeliveryStatus::Delivered);
        let failed = StoredNotification::new(Uuid::new_v4(), payload(), DeliveryStatus::Failed);
        cache.add_to_history(delivered.clone()).await;
        cache.add_to_history(failed.clone()).await;

        let read = cache.mark_read(delivered.id).await.unwrap();
        assert_eq!(read.status, DeliveryStatus::Read);
        assert_eq!(
            cache.get_notification_history().await.entries[1].status,
            DeliveryStatus::Read
        );
        assert!(cache.pending().await.iter().any(|n| n.id == delivered.id));

        assert!(matches!(cache.mark_read(failed.id).await, Err(AppError::Validation(_))));
        assert!(matches!(cache.mark_read(Uuid::new_v4()).await, Err(AppError::NotFound(_))));
    }
}
