//! Health & metrics monitor for the notification pipeline.
//!
//! Accumulates delivery, token and sync counters, mirrors them to the backend,
//! and periodically probes the push provider and the backend store.

pub mod metrics;
pub mod monitor;
pub mod probes;

pub use metrics::{AlertThresholds, MetricEvent, MetricsPatch, ThresholdBreach};
pub use monitor::{HealthMonitor, HealthReport, MonitorConfig};
pub use probes::{AdminSyncProbe, BackendProbe, HealthProbe, HealthProbes, ProbeKind, PushProviderProbe};
