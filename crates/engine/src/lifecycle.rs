//! Foreground/background lifecycle handling.
//!
//! Coming to the foreground refreshes the push token and syncs the local cache;
//! going to the background flushes the retry queue and the pending set to
//! local storage. Failures are reported to the monitor and never escape.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use herald_cache::{LocalNotificationCache, SyncOutcome};
use herald_common::error::AppError;
use herald_common::token::PushTokenSource;
use herald_monitor::{HealthMonitor, MetricEvent};
use herald_notifier::NotificationDispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Foreground,
    Background,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppState::Foreground => write!(f, "foreground"),
            AppState::Background => write!(f, "background"),
        }
    }
}

impl FromStr for AppState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "foreground" | "active" => Ok(AppState::Foreground),
            "background" | "inactive" => Ok(AppState::Background),
            other => Err(AppError::Validation(format!("Unknown app state: {}", other))),
        }
    }
}

pub struct LifecycleCoordinator {
    tokens: Arc<dyn PushTokenSource>,
    cache: Arc<LocalNotificationCache>,
    monitor: Arc<HealthMonitor>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl LifecycleCoordinator {
    pub fn new(
        tokens: Arc<dyn PushTokenSource>,
        cache: Arc<LocalNotificationCache>,
        monitor: Arc<HealthMonitor>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            tokens,
            cache,
            monitor,
            dispatcher,
        }
    }

    pub async fn handle_transition(&self, state: AppState) {
        tracing::info!(%state, "App state changed");
        match state {
            AppState::Foreground => self.on_foreground().await,
            AppState::Background => self.on_background().await,
        }
    }

    /// Follow `states` until the sender is dropped or `cancel` fires.
    ///
    /// Repeated sends of the state already handled are ignored.
    pub async fn run(&self, mut states: watch::Receiver<AppState>, cancel: CancellationToken) {
        let mut current = *states.borrow_and_update();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = states.changed() => {
                    if changed.is_err() {
                        tracing::debug!("App state channel closed");
                        break;
                    }
                }
            }

            let next = *states.borrow_and_update();
            if next == current {
                continue;
            }
            current = next;
            self.handle_transition(next).await;
        }
    }

    /// Push the local cache to the backend and record the outcome.
    pub async fn sync_cache(&self) -> SyncOutcome {
        let outcome = self.cache.sync_with_backend().await;
        self.monitor
            .record(MetricEvent::SyncCompleted {
                remaining: outcome.remaining,
                failed: outcome.failed,
            })
            .await;
        outcome
    }

    async fn on_foreground(&self) {
        match self.tokens.refresh_token().await {
            Ok(_) => {
                self.monitor
                    .record(MetricEvent::TokenRefreshed { success: true })
                    .await;
            }
            Err(e) => {
                self.monitor
                    .record(MetricEvent::TokenRefreshed { success: false })
                    .await;
                self.monitor
                    .report_error("push_token", &format!("Token refresh failed: {}", e))
                    .await;
            }
        }

        let outcome = self.sync_cache().await;
        if outcome.failed > 0 {
            self.monitor
                .report_error(
                    "cache_sync",
                    &format!("{} notification statuses failed to sync", outcome.failed),
                )
                .await;
        }
    }

    async fn on_background(&self) {
        let queued = self.dispatcher.persist_in_flight().await;

        if let Err(e) = self.cache.persist().await {
            self.monitor
                .report_error("local_cache", &format!("Failed to persist pending notifications: {}", e))
                .await;
            return;
        }
        tracing::debug!(queued, "Pending notifications saved for background");
    }
}
