//! Notification dispatcher.
//!
//! Single point of ingestion and delivery. Every change feed event is routed
//! by type; failures never escape `process_notification` and end up either in
//! the retry queue or as a terminal `failed` status.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use herald_cache::LocalNotificationCache;
use herald_common::backend::BackendStore;
use herald_common::error::AppError;
use herald_common::task::PeriodicTask;
use herald_common::token::PushTokenSource;
use herald_common::types::{
    DeliveryStatus, NotificationEvent, NotificationType, StoredNotification,
};
use herald_monitor::{HealthMonitor, MetricEvent};

use crate::feed::ChangeFeed;
use crate::push::PushClient;
use crate::queue::{RetryQueue, RetryQueueEntry};
use crate::routing;

/// Default number of delivery attempts per notification.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default retry queue drain interval.
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_attempts: u32,
    pub retry_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Collaborators the dispatcher talks to.
pub struct DispatcherDeps {
    pub backend: Arc<dyn BackendStore>,
    pub cache: Arc<LocalNotificationCache>,
    pub monitor: Arc<HealthMonitor>,
    pub push: PushClient,
    pub tokens: Arc<dyn PushTokenSource>,
    pub feed: Arc<dyn ChangeFeed>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Routed successfully (or ignored as an unknown type).
    Completed,
    /// Failed and handed to failure handling.
    Failed,
    /// Another call is already processing this id.
    Skipped,
}

/// Background machinery started by `initialize()`.
struct Runtime {
    cancel: CancellationToken,
    feed_consumer: JoinHandle<()>,
    retry_ticker: PeriodicTask,
}

pub struct NotificationDispatcher {
    backend: Arc<dyn BackendStore>,
    cache: Arc<LocalNotificationCache>,
    monitor: Arc<HealthMonitor>,
    push: PushClient,
    tokens: Arc<dyn PushTokenSource>,
    feed: Arc<dyn ChangeFeed>,
    config: DispatcherConfig,
    queue: RetryQueue,
    in_flight: Mutex<HashSet<Uuid>>,
    runtime: Mutex<Option<Runtime>>,
    tasks: TaskTracker,
}

impl NotificationDispatcher {
    pub fn new(deps: DispatcherDeps, config: DispatcherConfig) -> Self {
        Self {
            backend: deps.backend,
            cache: deps.cache,
            monitor: deps.monitor,
            push: deps.push,
            tokens: deps.tokens,
            feed: deps.feed,
            config,
            queue: RetryQueue::new(),
            in_flight: Mutex::new(HashSet::new()),
            runtime: Mutex::new(None),
            tasks: TaskTracker::new(),
        }
    }

    /// Subscribe to the change feed, request push permission and start the
    /// retry processor. Calling it again while running does nothing.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), AppError> {
        let mut runtime = self.runtime.lock().await;
        if runtime.is_some() {
            tracing::debug!("Dispatcher already initialized");
            return Ok(());
        }

        let events = self.feed.subscribe().await?;

        if !self.tokens.request_permission().await {
            tracing::warn!("Push permission not granted; push deliveries will fail until a token is available");
        }

        self.tasks.reopen();
        let cancel = CancellationToken::new();
        let feed_consumer = tokio::spawn(Self::consume_feed(
            Arc::downgrade(self),
            events,
            cancel.clone(),
        ));

        let dispatcher: Weak<Self> = Arc::downgrade(self);
        let retry_ticker = PeriodicTask::spawn("retry-queue", self.config.retry_interval, move || {
            let dispatcher = dispatcher.clone();
            async move {
                if let Some(dispatcher) = dispatcher.upgrade() {
                    dispatcher.process_retry_queue().await;
                }
            }
        });

        *runtime = Some(Runtime {
            cancel,
            feed_consumer,
            retry_ticker,
        });

        tracing::info!(
            max_attempts = self.config.max_attempts,
            retry_interval_secs = self.config.retry_interval.as_secs(),
            "Notification dispatcher started"
        );
        Ok(())
    }

    async fn consume_feed(
        dispatcher: Weak<Self>,
        mut events: mpsc::Receiver<NotificationEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };

            let Some(event) = event else {
                tracing::warn!("Change feed ended");
                break;
            };
            let Some(dispatcher) = dispatcher.upgrade() else {
                break;
            };

            tracing::debug!(notification_id = %event.id, kind = %event.payload.kind, "Received notification");
            let worker = Arc::clone(&dispatcher);
            dispatcher.tasks.spawn(async move {
                worker.process_notification(&event).await;
            });
        }
    }

    /// Route one notification. Errors are absorbed into retry/failure bookkeeping.
    pub async fn process_notification(&self, event: &NotificationEvent) -> DispatchOutcome {
        if !self.in_flight.lock().await.insert(event.id) {
            tracing::debug!(notification_id = %event.id, "Notification already in flight, skipping");
            return DispatchOutcome::Skipped;
        }

        self.monitor.record(MetricEvent::Sent).await;

        let outcome = match self.dispatch(event).await {
            Ok(()) => {
                self.queue.remove(event.id).await;
                DispatchOutcome::Completed
            }
            Err(e) => {
                self.handle_failure(event, e).await;
                DispatchOutcome::Failed
            }
        };

        self.in_flight.lock().await.remove(&event.id);
        outcome
    }

    async fn dispatch(&self, event: &NotificationEvent) -> Result<(), AppError> {
        let payload = &event.payload;

        match &payload.kind {
            NotificationType::Push | NotificationType::DeepLink => self.deliver_push(event).await,
            NotificationType::ArticleLink => {
                routing::validate_article_link(payload.deep_link.as_deref())?;
                self.deliver_push(event).await
            }
            NotificationType::Scheduled => {
                let scheduled_for = routing::scheduled_for(payload)?;
                self.backend
                    .insert_scheduled_notification(payload, scheduled_for)
                    .await?;
                tracing::info!(notification_id = %event.id, %scheduled_for, "Notification scheduled");
                Ok(())
            }
            NotificationType::Web => {
                self.backend.insert_web_notification(payload).await?;
                self.update_delivery_status(event, DeliveryStatus::Sent, Utc::now())
                    .await;
                Ok(())
            }
            NotificationType::Unknown(kind) => {
                tracing::warn!(notification_id = %event.id, kind = %kind, "Unknown notification type, ignoring");
                Ok(())
            }
        }
    }

    async fn deliver_push(&self, event: &NotificationEvent) -> Result<(), AppError> {
        let token = self
            .tokens
            .current_token()
            .await
            .ok_or_else(|| AppError::Delivery("no push token available".to_string()))?;

        let receipt = self.push.send(&token, &event.payload).await?;
        tracing::info!(
            notification_id = %event.id,
            status = receipt.status,
            "Push notification delivered"
        );

        self.update_delivery_status(event, DeliveryStatus::Delivered, Utc::now())
            .await;
        Ok(())
    }

    async fn handle_failure(&self, event: &NotificationEvent, error: AppError) {
        let attempts = self.queue.attempts(event.id).await + 1;

        if error.is_retryable() && attempts < self.config.max_attempts {
            self.queue.enqueue(event.clone(), attempts).await;
            self.monitor.record(MetricEvent::Retried).await;
            self.monitor.record(MetricEvent::Failed).await;
            tracing::warn!(
                notification_id = %event.id,
                attempts,
                max_attempts = self.config.max_attempts,
                error = %error,
                "Notification delivery failed, queued for retry"
            );
            return;
        }

        if error.is_retryable() {
            tracing::error!(
                notification_id = %event.id,
                attempts,
                error = %error,
                "Notification delivery failed permanently"
            );
        } else {
            tracing::warn!(notification_id = %event.id, error = %error, "Rejected invalid notification");
        }

        self.update_delivery_status(event, DeliveryStatus::Failed, Utc::now())
            .await;
        self.monitor.record(MetricEvent::Failed).await;
        self.queue.remove(event.id).await;
    }

    /// Re-run every queued notification once.
    pub async fn process_retry_queue(&self) {
        let entries = self.queue.snapshot().await;
        if entries.is_empty() {
            return;
        }

        tracing::debug!(queued = entries.len(), "Processing retry queue");
        for RetryQueueEntry { event, attempts } in entries {
            if self.process_notification(&event).await == DispatchOutcome::Failed {
                tracing::debug!(notification_id = %event.id, attempts, "Retry attempt failed");
            }
        }
    }

    /// Record a status change in the local cache and the backend.
    ///
    /// The cache is written first so the change survives a backend outage; the
    /// cache sync pushes it later.
    pub async fn update_delivery_status(
        &self,
        event: &NotificationEvent,
        status: DeliveryStatus,
        timestamp: DateTime<Utc>,
    ) {
        let stored = StoredNotification {
            id: event.id,
            status,
            timestamp,
            payload: event.payload.clone(),
            retry_count: self.queue.attempts(event.id).await,
        };

        if !self.cache.upsert_status(stored.clone()).await {
            return;
        }

        if let Err(e) = self
            .backend
            .update_notification_status(event.id, status, timestamp)
            .await
        {
            tracing::warn!(
                notification_id = %event.id,
                %status,
                error = %e,
                "Failed to persist status, will sync from local cache"
            );
        }

        if status != DeliveryStatus::Pending {
            self.cache.add_to_history(stored).await;
        }
        if status == DeliveryStatus::Delivered {
            self.monitor.record(MetricEvent::Delivered).await;
        }
    }

    /// Re-enqueue notifications that were still queued when the previous
    /// process stopped. Returns how many were restored.
    pub async fn restore_from_cache(&self) -> usize {
        let mut restored = 0;
        for stored in self.cache.load_in_flight().await {
            let event = NotificationEvent {
                id: stored.id,
                payload: stored.payload,
                created_at: stored.timestamp,
            };
            self.queue.enqueue(event, stored.retry_count).await;
            restored += 1;
        }

        if restored > 0 {
            tracing::info!(restored, "Restored in-flight notifications into retry queue");
        }
        restored
    }

    /// Save the retry queue under the in-flight key, replacing the previous set.
    pub async fn persist_in_flight(&self) -> usize {
        let entries: Vec<StoredNotification> = self
            .queue
            .snapshot()
            .await
            .into_iter()
            .map(|entry| StoredNotification {
                id: entry.event.id,
                status: DeliveryStatus::Pending,
                timestamp: entry.event.created_at,
                payload: entry.event.payload,
                retry_count: entry.attempts,
            })
            .collect();
        let count = entries.len();

        if let Err(e) = self.cache.save_in_flight(&entries).await {
            tracing::warn!(error = %e, count, "Failed to persist in-flight notifications");
            return 0;
        }

        tracing::debug!(count, "Persisted in-flight notifications");
        count
    }

    pub async fn queue_snapshot(&self) -> Vec<RetryQueueEntry> {
        self.queue.snapshot().await
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.len().await
    }

    /// Stop the feed consumer and retry ticker, then wait for in-flight work.
    pub async fn cleanup(&self) {
        let Some(runtime) = self.runtime.lock().await.take() else {
            return;
        };

        runtime.cancel.cancel();
        runtime.retry_ticker.shutdown().await;
        if let Err(e) = runtime.feed_consumer.await {
            tracing::warn!(error = %e, "Change feed consumer ended abnormally");
        }

        self.tasks.close();
        self.tasks.wait().await;
        tracing::info!("Notification dispatcher stopped");
    }
}
