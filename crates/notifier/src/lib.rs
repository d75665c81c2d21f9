//! Notification dispatcher.
//!
//! Consumes newly inserted notification rows from the change feed and:
//! 1. Routes them by type (push, article link, scheduled, web)
//! 2. Delivers push notifications through the push provider
//! 3. Retries failed deliveries from an in-memory queue with a bounded attempt cap
//! 4. Mirrors every status change into the local cache and the backend

pub mod dispatcher;
pub mod feed;
pub mod push;
pub mod queue;
pub mod routing;

pub use dispatcher::{DispatchOutcome, DispatcherConfig, DispatcherDeps, NotificationDispatcher};
pub use feed::{ChangeFeed, PgChangeFeed};
pub use push::{PushClient, PushReceipt};
