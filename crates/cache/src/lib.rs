//! Offline-safe local mirror of notifications pending sync, plus a bounded history log.

pub mod cache;
pub mod store;

pub use cache::{LocalNotificationCache, NotificationHistory, SyncOutcome};
pub use store::{FileStore, KeyValueStore};
