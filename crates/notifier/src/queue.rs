//! In-memory retry queue, keyed by notification id.

use std::collections::HashMap;

use tokio::sync::Mutex;
use uuid::Uuid;

use herald_common::types::NotificationEvent;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryQueueEntry {
    pub event: NotificationEvent,
    /// Failed attempts so far
    pub attempts: u32,
}

#[derive(Debug, Default)]
pub struct RetryQueue {
    entries: Mutex<HashMap<Uuid, RetryQueueEntry>>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Failed attempts recorded for `id` (0 when not queued).
    pub async fn attempts(&self, id: Uuid) -> u32 {
        self.entries
            .lock()
            .await
            .get(&id)
            .map(|e| e.attempts)
            .unwrap_or(0)
    }

    pub async fn enqueue(&self, event: NotificationEvent, attempts: u32) {
        self.entries
            .lock()
            .await
            .insert(event.id, RetryQueueEntry { event, attempts });
    }

    pub async fn remove(&self, id: Uuid) -> Option<RetryQueueEntry> {
        self.entries.lock().await.remove(&id)
    }

    /// Entries ordered by original creation time.
    pub async fn snapshot(&self) -> Vec<RetryQueueEntry> {
        let mut entries: Vec<RetryQueueEntry> = self.entries.lock().await.values().cloned().collect();
        entries.sort_by_key(|e| e.event.created_at);
        entries
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
