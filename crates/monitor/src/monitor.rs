use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;

use herald_common::backend::BackendStore;
use herald_common::task::PeriodicTask;
use herald_common::types::{
    HealthCheckResult, HealthDetails, HealthStatus, MonitoringAlert, NotificationMetrics,
};

use crate::metrics::{AlertThresholds, MetricEvent, MetricsPatch, ThresholdBreach};
use crate::probes::{HealthProbes, ProbeKind};

/// Default health check interval (5 minutes).
const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub health_check_interval: Duration,
    pub thresholds: AlertThresholds,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            thresholds: AlertThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub metrics: NotificationMetrics,
    pub health: HealthCheckResult,
    pub threshold_breaches: Vec<ThresholdBreach>,
}

/// Owner of the pipeline metrics and the periodic health-check loop.
///
/// Other components never touch the metrics directly; they go through
/// [`record`](Self::record) or [`update_metrics`](Self::update_metrics), and
/// every change is mirrored to the backend snapshot.
pub struct HealthMonitor {
    backend: Arc<dyn BackendStore>,
    probes: HealthProbes,
    config: MonitorConfig,
    metrics: Mutex<VersionedMetrics>,
    /// Version of the last snapshot written to the backend.
    persisted: Mutex<u64>,
    ticker: Mutex<Option<PeriodicTask>>,
}

#[derive(Default)]
struct VersionedMetrics {
    current: NotificationMetrics,
    version: u64,
}

impl HealthMonitor {
    pub fn new(backend: Arc<dyn BackendStore>, probes: HealthProbes, config: MonitorConfig) -> Self {
        Self {
            backend,
            probes,
            config,
            metrics: Mutex::new(VersionedMetrics::default()),
            persisted: Mutex::new(0),
            ticker: Mutex::new(None),
        }
    }

    /// Load the persisted metrics snapshot and start the health-check loop.
    pub async fn initialize(self: &Arc<Self>) {
        match self.backend.load_metrics().await {
            Ok(Some(snapshot)) => {
                self.metrics.lock().await.current = snapshot;
                tracing::info!("Loaded persisted notification metrics");
            }
            Ok(None) => tracing::info!("No persisted metrics, starting from zero"),
            Err(e) => tracing::warn!(error = %e, "Failed to load persisted metrics"),
        }

        let mut ticker = self.ticker.lock().await;
        if ticker.is_some() {
            tracing::debug!("Health monitor already running");
            return;
        }

        let monitor: Weak<Self> = Arc::downgrade(self);
        *ticker = Some(PeriodicTask::spawn(
            "health-check",
            self.config.health_check_interval,
            move || {
                let monitor = monitor.clone();
                async move {
                    if let Some(monitor) = monitor.upgrade() {
                        monitor.scheduled_check().await;
                    }
                }
            },
        ));

        tracing::info!(
            interval_secs = self.config.health_check_interval.as_secs(),
            "Health monitor started"
        );
    }

    /// Run every probe and aggregate the result.
    ///
    /// A non-healthy result writes one `monitoring_alerts` row per failing probe.
    pub async fn perform_health_check(&self) -> HealthCheckResult {
        let (push_provider, admin_sync, backend) = tokio::join!(
            self.probes.push_provider.check(),
            self.probes.admin_sync.check(),
            self.probes.backend.check(),
        );

        let results = [
            (ProbeKind::PushProvider, push_provider),
            (ProbeKind::AdminSync, admin_sync),
            (ProbeKind::Backend, backend),
        ];
        let failing: Vec<ProbeKind> = results
            .iter()
            .filter(|(_, ok)| !ok)
            .map(|(kind, _)| *kind)
            .collect();

        let status = if failing.is_empty() {
            HealthStatus::Healthy
        } else if failing.len() < results.len() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Failed
        };

        if status == HealthStatus::Healthy {
            tracing::debug!("Health check passed");
        } else {
            tracing::warn!(%status, failing = failing.len(), "Health check found unreachable dependencies");
            for kind in &failing {
                let alert = MonitoringAlert::new(
                    "health_check",
                    kind.as_str(),
                    format!("{} probe failed (overall status: {})", kind, status),
                );
                self.persist_alert(&alert).await;
            }
        }

        HealthCheckResult {
            status,
            timestamp: Utc::now(),
            details: HealthDetails {
                push_provider,
                admin_sync,
                backend,
            },
        }
    }

    /// Merge a partial update into the metrics and persist the snapshot.
    pub async fn update_metrics(&self, patch: MetricsPatch) -> NotificationMetrics {
        let (version, snapshot) = self.mutate(|metrics| patch.apply(metrics)).await;
        self.persist_metrics(version, &snapshot).await;
        snapshot
    }

    /// Apply an increment and persist the snapshot.
    pub async fn record(&self, event: MetricEvent) {
        let (version, snapshot) = self.mutate(|metrics| event.apply(metrics)).await;
        self.persist_metrics(version, &snapshot).await;
    }

    /// Copy of the current metrics.
    pub async fn metrics(&self) -> NotificationMetrics {
        self.metrics.lock().await.current.clone()
    }

    /// Current metrics plus a freshly run health check.
    pub async fn generate_health_report(&self) -> HealthReport {
        let health = self.perform_health_check().await;
        let metrics = self.metrics().await;
        let threshold_breaches = self.config.thresholds.breaches(&metrics);

        HealthReport {
            metrics,
            health,
            threshold_breaches,
        }
    }

    /// Record an error raised by another component as an alert.
    pub async fn report_error(&self, component: &str, message: &str) {
        tracing::error!(component, message, "Component error reported to monitor");
        self.persist_alert(&MonitoringAlert::new("error", component, message))
            .await;
    }

    /// Stop the health-check loop, waiting for a running check to finish.
    pub async fn cleanup(&self) {
        let ticker = self.ticker.lock().await.take();
        if let Some(ticker) = ticker {
            ticker.shutdown().await;
            tracing::info!("Health monitor stopped");
        }
    }

    async fn scheduled_check(&self) {
        self.perform_health_check().await;

        let metrics = self.metrics().await;
        for breach in self.config.thresholds.breaches(&metrics) {
            tracing::warn!(
                metric = breach.metric,
                rate = breach.rate,
                threshold = breach.threshold,
                "Alert threshold exceeded"
            );
            let alert = MonitoringAlert::new(
                "threshold",
                breach.metric,
                format!(
                    "{} at {:.1}% exceeds {:.1}%",
                    breach.metric,
                    breach.rate * 100.0,
                    breach.threshold * 100.0
                ),
            );
            self.persist_alert(&alert).await;
        }
    }

    async fn mutate(&self, change: impl FnOnce(&mut NotificationMetrics)) -> (u64, NotificationMetrics) {
        let mut metrics = self.metrics.lock().await;
        change(&mut metrics.current);
        metrics.version += 1;
        (metrics.version, metrics.current.clone())
    }

    /// Write `snapshot` unless a newer one already reached the backend.
    async fn persist_metrics(&self, version: u64, snapshot: &NotificationMetrics) {
        let mut persisted = self.persisted.lock().await;
        if version <= *persisted {
            return;
        }

        match self.backend.upsert_metrics(snapshot).await {
            Ok(()) => *persisted = version,
            Err(e) => tracing::warn!(error = %e, version, "Failed to persist metrics snapshot"),
        }
    }

    async fn persist_alert(&self, alert: &MonitoringAlert) {
        if let Err(e) = self.backend.insert_alert(alert).await {
            tracing::warn!(
                component = %alert.component,
                error = %e,
                "Failed to persist monitoring alert"
            );
        }
    }
}
