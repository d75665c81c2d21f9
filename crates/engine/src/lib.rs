//! Orchestration of the notification pipeline.
//!
//! Wires the local cache, monitor and dispatcher into one [`NotificationService`]
//! and reacts to foreground/background transitions through the
//! [`LifecycleCoordinator`].

pub mod lifecycle;
pub mod service;

pub use lifecycle::{AppState, LifecycleCoordinator};
pub use service::{NotificationService, ServiceConfig, ServiceDeps};
