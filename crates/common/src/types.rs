use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of notification, as written by the producer of the `notifications` row.
///
/// Unrecognized type strings are kept as `Unknown` so the dispatcher can log
/// and skip them instead of failing deserialization of the whole event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationType {
    Push,
    Scheduled,
    ArticleLink,
    Web,
    DeepLink,
    Unknown(String),
}

impl From<String> for NotificationType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "PUSH" => NotificationType::Push,
            "SCHEDULED" => NotificationType::Scheduled,
            "ARTICLE_LINK" => NotificationType::ArticleLink,
            "WEB" => NotificationType::Web,
            "DEEP_LINK" => NotificationType::DeepLink,
            _ => NotificationType::Unknown(value),
        }
    }
}

impl From<NotificationType> for String {
    fn from(value: NotificationType) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationType::Push => write!(f, "PUSH"),
            NotificationType::Scheduled => write!(f, "SCHEDULED"),
            NotificationType::ArticleLink => write!(f, "ARTICLE_LINK"),
            NotificationType::Web => write!(f, "WEB"),
            NotificationType::DeepLink => write!(f, "DEEP_LINK"),
            NotificationType::Unknown(other) => write!(f, "{}", other),
        }
    }
}

/// Notification delivery status.
///
/// Transitions only move forward: `pending → {sent, delivered, failed}`,
/// `sent → {delivered, failed}`, `delivered → read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
    Read,
}

impl DeliveryStatus {
    /// Whether moving from `self` to `next` is a legal forward transition.
    /// Re-applying the current status is allowed and treated as a no-op.
    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;

        self == next
            || matches!(
                (self, next),
                (Pending, Sent | Delivered | Failed) | (Sent, Delivered | Failed) | (Delivered, Read)
            )
    }

    /// Statuses a row may currently hold for `self` to be written over them.
    pub fn predecessors(self) -> Vec<DeliveryStatus> {
        use DeliveryStatus::*;

        [Pending, Sent, Delivered, Failed, Read]
            .into_iter()
            .filter(|from| from.can_transition_to(self))
            .collect()
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Pending => write!(f, "pending"),
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Delivered => write!(f, "delivered"),
            DeliveryStatus::Failed => write!(f, "failed"),
            DeliveryStatus::Read => write!(f, "read"),
        }
    }
}

/// Human-readable notification payload ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub body: String,
    /// `scheme://articles/<id>` for `ARTICLE_LINK` notifications
    #[serde(default, alias = "deepLink", skip_serializing_if = "Option::is_none")]
    pub deep_link: Option<String>,
    /// Free-form extra data forwarded to the push provider
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// A newly inserted `notifications` row, as delivered by the change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: Uuid,
    #[serde(flatten)]
    pub payload: NotificationPayload,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Offline mirror of a notification, owned by the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredNotification {
    pub id: Uuid,
    pub status: DeliveryStatus,
    pub timestamp: DateTime<Utc>,
    pub payload: NotificationPayload,
    #[serde(default)]
    pub retry_count: u32,
}

impl StoredNotification {
    pub fn new(id: Uuid, payload: NotificationPayload, status: DeliveryStatus) -> Self {
        Self {
            id,
            status,
            timestamp: Utc::now(),
            payload,
            retry_count: 0,
        }
    }
}

/// Delivery counters, cumulative for the process lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryStats {
    pub total_sent: u64,
    pub delivered: u64,
    pub failed: u64,
    pub retried: u64,
}

/// Push token refresh counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenHealth {
    pub valid_tokens: u64,
    pub expired_tokens: u64,
    pub refresh_attempts: u64,
    pub refresh_success: u64,
}

/// Status of the local cache → backend sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncStatus {
    pub last_sync_time: Option<DateTime<Utc>>,
    pub pending_updates: u64,
    pub failed_sync: u64,
    pub retry_count: u64,
    /// Sync passes attempted, the denominator of the sync failure rate
    pub total_syncs: u64,
}

/// Full metrics snapshot, mirrored to `monitoring_metrics` on every update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationMetrics {
    pub delivery_stats: DeliveryStats,
    pub token_health: TokenHealth,
    pub sync_status: SyncStatus,
}

/// Aggregated health of the monitored dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Failed,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Per-dependency reachability from the last health check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthDetails {
    pub push_provider: bool,
    pub admin_sync: bool,
    pub backend: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub details: HealthDetails,
}

/// A row in `monitoring_alerts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringAlert {
    #[serde(rename = "type")]
    pub alert_type: String,
    pub component: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl MonitoringAlert {
    pub fn new(
        alert_type: impl Into<String>,
        component: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            alert_type: alert_type.into(),
            component: component.into(),
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_forward_transitions() {
        use DeliveryStatus::*;

        assert!(Pending.can_transition_to(Sent));
        assert!(Pending.can_transition_to(Delivered));
        assert!(Sent.can_transition_to(Failed));
        assert!(Delivered.can_transition_to(Read));
        assert!(Delivered.can_transition_to(Delivered));

        assert!(!Delivered.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Delivered));
        assert!(!Read.can_transition_to(Delivered));
        assert!(!Pending.can_transition_to(Read));
    }

    #[test]
    fn test_predecessors_exclude_later_statuses() {
        use DeliveryStatus::*;

        assert_eq!(Pending.predecessors(), vec![Pending]);
        assert_eq!(Delivered.predecessors(), vec![Pending, Sent, Delivered]);
        assert_eq!(Read.predecessors(), vec![Delivered, Read]);
    }

    #[test]
    fn test_notification_type_round_trips_unknown() {
        let kind: NotificationType = serde_json::from_str("\"CAROUSEL\"").unwrap();
        assert_eq!(kind, NotificationType::Unknown("CAROUSEL".to_string()));
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"CAROUSEL\"");
    }

    #[test]
    fn test_event_from_change_feed_row() {
        let event: NotificationEvent = serde_json::from_value(serde_json::json!({
            "id": "6f1c1d6e-3c1a-4f9e-9d7a-2b8f5e0c4a11",
            "type": "ARTICLE_LINK",
            "title": "Breaking",
            "body": "Something happened",
            "deep_link": "newsapp://articles/42",
            "data": { "section": "world" },
            "created_at": "2026-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(event.payload.kind, NotificationType::ArticleLink);
        assert_eq!(event.payload.deep_link.as_deref(), Some("newsapp://articles/42"));
        assert_eq!(event.payload.data["section"], "world");
    }

    #[test]
    fn test_metrics_snapshot_tolerates_missing_blocks() {
        let metrics: NotificationMetrics =
            serde_json::from_value(serde_json::json!({ "delivery_stats": { "delivered": 4 } }))
                .unwrap();
        assert_eq!(metrics.delivery_stats.delivered, 4);
        assert_eq!(metrics.token_health, TokenHealth::default());
    }
}
