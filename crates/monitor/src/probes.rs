//! Dependency health probes.
//!
//! Each probe answers "reachable?" with a plain `bool`; errors are logged at
//! debug level and reported as `false`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use herald_common::backend::BackendStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    PushProvider,
    AdminSync,
    Backend,
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::PushProvider => "push_provider",
            ProbeKind::AdminSync => "admin_sync",
            ProbeKind::Backend => "backend",
        }
    }
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> bool;
}

/// The three probes the monitor runs on every health check.
#[derive(Clone)]
pub struct HealthProbes {
    pub push_provider: Arc<dyn HealthProbe>,
    pub admin_sync: Arc<dyn HealthProbe>,
    pub backend: Arc<dyn HealthProbe>,
}

impl HealthProbes {
    /// Standard probe set: push provider over HTTP, admin sync and liveness over the backend.
    pub fn standard(
        push_health_url: impl Into<String>,
        push_access_token: impl Into<String>,
        backend: Arc<dyn BackendStore>,
    ) -> Self {
        Self {
            push_provider: Arc::new(PushProviderProbe::new(push_health_url, push_access_token)),
            admin_sync: Arc::new(AdminSyncProbe::new(backend.clone())),
            backend: Arc::new(BackendProbe::new(backend)),
        }
    }
}

/// Authenticated GET against the push provider API.
pub struct PushProviderProbe {
    http_client: Client,
    url: String,
    access_token: String,
    timeout: Duration,
}

impl PushProviderProbe {
    pub fn new(url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            url: url.into(),
            access_token: access_token.into(),
            timeout: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl HealthProbe for PushProviderProbe {
    async fn check(&self) -> bool {
        let response = self
            .http_client
            .get(&self.url)
            .bearer_auth(&self.access_token)
            .timeout(self.timeout)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::debug!(status = %resp.status(), "Push provider probe got error status");
                false
            }
            Err(e) => {
                tracing::debug!(error = %e, "Push provider probe failed");
                false
            }
        }
    }
}

/// Bounded count query against `notifications`, proving administrative read access.
pub struct AdminSyncProbe {
    backend: Arc<dyn BackendStore>,
}

impl AdminSyncProbe {
    pub fn new(backend: Arc<dyn BackendStore>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl HealthProbe for AdminSyncProbe {
    async fn check(&self) -> bool {
        match self.backend.count_notifications(1).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Admin sync probe failed");
                false
            }
        }
    }
}

/// Liveness call against the backend store.
pub struct BackendProbe {
    backend: Arc<dyn BackendStore>,
}

impl BackendProbe {
    pub fn new(backend: Arc<dyn BackendStore>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl HealthProbe for BackendProbe {
    async fn check(&self) -> bool {
        match self.backend.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Backend probe failed");
                false
            }
        }
    }
}
