//! Metric updates and alert thresholds.

use chrono::{DateTime, Utc};
use serde::Serialize;

use herald_common::types::NotificationMetrics;

/// Field-wise overwrite of delivery counters. `None` leaves a counter untouched.
#[derive(Debug, Clone, Default)]
pub struct DeliveryStatsPatch {
    pub total_sent: Option<u64>,
    pub delivered: Option<u64>,
    pub failed: Option<u64>,
    pub retried: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct TokenHealthPatch {
    pub valid_tokens: Option<u64>,
    pub expired_tokens: Option<u64>,
    pub refresh_attempts: Option<u64>,
    pub refresh_success: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct SyncStatusPatch {
    pub last_sync_time: Option<DateTime<Utc>>,
    pub pending_updates: Option<u64>,
    pub failed_sync: Option<u64>,
    pub retry_count: Option<u64>,
    pub total_syncs: Option<u64>,
}

/// Partial metrics update, merged counter by counter.
///
/// Unlike replacing whole sub-objects, merging a patch that sets only
/// `delivery_stats.delivered` keeps every sibling counter.
#[derive(Debug, Clone, Default)]
pub struct MetricsPatch {
    pub delivery_stats: DeliveryStatsPatch,
    pub token_health: TokenHealthPatch,
    pub sync_status: SyncStatusPatch,
}

macro_rules! merge_fields {
    ($target:expr, $patch:expr, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $patch.$field {
                $target.$field = value;
            }
        )+
    };
}

impl MetricsPatch {
    pub fn apply(&self, metrics: &mut NotificationMetrics) {
        merge_fields!(
            metrics.delivery_stats,
            self.delivery_stats,
            total_sent,
            delivered,
            failed,
            retried
        );
        merge_fields!(
            metrics.token_health,
            self.token_health,
            valid_tokens,
            expired_tokens,
            refresh_attempts,
            refresh_success
        );
        merge_fields!(
            metrics.sync_status,
            self.sync_status,
            pending_updates,
            failed_sync,
            retry_count,
            total_syncs
        );
        if let Some(time) = self.sync_status.last_sync_time {
            metrics.sync_status.last_sync_time = Some(time);
        }
    }
}

/// Incremental update applied atomically inside the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricEvent {
    /// A notification entered dispatch (including retries).
    Sent,
    Delivered,
    /// A delivery attempt failed.
    Failed,
    /// A failed notification was queued for another attempt.
    Retried,
    TokenRefreshed { success: bool },
    /// A cache → backend sync pass finished.
    SyncCompleted { remaining: usize, failed: usize },
}

impl MetricEvent {
    pub fn apply(self, metrics: &mut NotificationMetrics) {
        let delivery = &mut metrics.delivery_stats;
        let token = &mut metrics.token_health;
        let sync = &mut metrics.sync_status;

        match self {
            MetricEvent::Sent => delivery.total_sent += 1,
            MetricEvent::Delivered => delivery.delivered += 1,
            MetricEvent::Failed => delivery.failed += 1,
            MetricEvent::Retried => delivery.retried += 1,
            MetricEvent::TokenRefreshed { success } => {
                token.refresh_attempts += 1;
                if success {
                    token.refresh_success += 1;
                    token.valid_tokens += 1;
                } else {
                    token.expired_tokens += 1;
                }
            }
            MetricEvent::SyncCompleted { remaining, failed } => {
                sync.total_syncs += 1;
                sync.last_sync_time = Some(Utc::now());
                sync.pending_updates = remaining as u64;
                if failed > 0 {
                    sync.failed_sync += 1;
                    sync.retry_count += failed as u64;
                }
            }
        }
    }
}

/// Failure-rate limits above which an alert is raised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    pub delivery_failure_rate: f64,
    pub token_refresh_failure_rate: f64,
    pub sync_failure_rate: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            delivery_failure_rate: 0.10,
            token_refresh_failure_rate: 0.05,
            sync_failure_rate: 0.10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdBreach {
    pub metric: &'static str,
    pub rate: f64,
    pub threshold: f64,
}

impl AlertThresholds {
    /// Rates strictly above their threshold. Counters with no samples never breach.
    pub fn breaches(&self, metrics: &NotificationMetrics) -> Vec<ThresholdBreach> {
        let delivery = &metrics.delivery_stats;
        let token = &metrics.token_health;
        let sync = &metrics.sync_status;

        let checks = [
            (
                "delivery_failure_rate",
                rate(delivery.failed, delivery.total_sent),
                self.delivery_failure_rate,
            ),
            (
                "token_refresh_failure_rate",
                rate(
                    token.refresh_attempts.saturating_sub(token.refresh_success),
                    token.refresh_attempts,
                ),
                self.token_refresh_failure_rate,
            ),
            (
                "sync_failure_rate",
                rate(sync.failed_sync, sync.total_syncs),
                self.sync_failure_rate,
            ),
        ];

        checks
            .into_iter()
            .filter_map(|(metric, rate, threshold)| {
                rate.filter(|r| *r > threshold).map(|rate| ThresholdBreach {
                    metric,
                    rate,
                    threshold,
                })
            })
            .collect()
    }
}

fn rate(numerator: u64, denominator: u64) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}
