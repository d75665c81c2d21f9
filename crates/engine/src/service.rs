//! Process-wide notification service.
//!
//! Built once at startup and shared behind an `Arc`. `start()` brings the
//! components up in dependency order and `shutdown()` takes them down in
//! reverse.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;

use herald_cache::{KeyValueStore, LocalNotificationCache};
use herald_common::backend::BackendStore;
use herald_common::config::AppConfig;
use herald_common::task::PeriodicTask;
use herald_common::token::PushTokenSource;
use herald_monitor::{HealthMonitor, HealthProbes, MonitorConfig};
use herald_notifier::{ChangeFeed, DispatcherConfig, DispatcherDeps, NotificationDispatcher, PushClient};

use crate::lifecycle::LifecycleCoordinator;

/// Default cache → backend sync interval.
const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub dispatcher: DispatcherConfig,
    pub monitor: MonitorConfig,
    pub sync_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherConfig::default(),
            monitor: MonitorConfig::default(),
            sync_interval: DEFAULT_SYNC_INTERVAL,
        }
    }
}

impl ServiceConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            dispatcher: DispatcherConfig {
                max_attempts: config.retry_max_attempts,
                retry_interval: Duration::from_millis(config.retry_interval_ms),
            },
            monitor: MonitorConfig {
                health_check_interval: Duration::from_millis(config.health_check_interval_ms),
                ..MonitorConfig::default()
            },
            sync_interval: Duration::from_millis(config.sync_interval_ms),
        }
    }
}

/// External collaborators the service is built from.
pub struct ServiceDeps {
    pub backend: Arc<dyn BackendStore>,
    pub store: Arc<dyn KeyValueStore>,
    pub tokens: Arc<dyn PushTokenSource>,
    pub feed: Arc<dyn ChangeFeed>,
    pub push: PushClient,
    pub probes: HealthProbes,
}

pub struct NotificationService {
    cache: Arc<LocalNotificationCache>,
    monitor: Arc<HealthMonitor>,
    dispatcher: Arc<NotificationDispatcher>,
    lifecycle: Arc<LifecycleCoordinator>,
    sync_interval: Duration,
    sync_ticker: Mutex<Option<PeriodicTask>>,
}

impl NotificationService {
    pub fn new(deps: ServiceDeps, config: ServiceConfig) -> Self {
        let cache = Arc::new(LocalNotificationCache::new(deps.store, deps.backend.clone()));
        let monitor = Arc::new(HealthMonitor::new(
            deps.backend.clone(),
            deps.probes,
            config.monitor,
        ));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            DispatcherDeps {
                backend: deps.backend,
                cache: cache.clone(),
                monitor: monitor.clone(),
                push: deps.push,
                tokens: deps.tokens.clone(),
                feed: deps.feed,
            },
            config.dispatcher,
        ));
        let lifecycle = Arc::new(LifecycleCoordinator::new(
            deps.tokens,
            cache.clone(),
            monitor.clone(),
            dispatcher.clone(),
        ));

        Self {
            cache,
            monitor,
            dispatcher,
            lifecycle,
            sync_interval: config.sync_interval,
            sync_ticker: Mutex::new(None),
        }
    }

    /// Initialize cache, monitor and dispatcher, then start the sync loop.
    pub async fn start(&self) -> anyhow::Result<()> {
        self.cache.initialize().await;
        self.monitor.initialize().await;

        self.dispatcher.restore_from_cache().await;
        self.dispatcher.initialize().await?;

        let mut ticker = self.sync_ticker.lock().await;
        if ticker.is_none() {
            let lifecycle: Weak<LifecycleCoordinator> = Arc::downgrade(&self.lifecycle);
            *ticker = Some(PeriodicTask::spawn("cache-sync", self.sync_interval, move || {
                let lifecycle = lifecycle.clone();
                async move {
                    if let Some(lifecycle) = lifecycle.upgrade() {
                        lifecycle.sync_cache().await;
                    }
                }
            }));
        }

        tracing::info!(
            sync_interval_secs = self.sync_interval.as_secs(),
            "Notification service started"
        );
        Ok(())
    }

    /// Stop every loop, then flush in-flight work to the local cache.
    pub async fn shutdown(&self) {
        let ticker = self.sync_ticker.lock().await.take();
        if let Some(ticker) = ticker {
            ticker.shutdown().await;
        }

        self.dispatcher.cleanup().await;
        self.dispatcher.persist_in_flight().await;
        if let Err(e) = self.cache.persist().await {
            tracing::error!(error = %e, "Failed to flush local cache on shutdown");
        }
        self.monitor.cleanup().await;

        tracing::info!("Notification service stopped");
    }

    pub fn cache(&self) -> &Arc<LocalNotificationCache> {
        &self.cache
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleCoordinator> {
        &self.lifecycle
    }
}
