//! Device push token source.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::AppError;

/// Where the dispatcher gets the device push token from, and how it is refreshed.
#[async_trait]
pub trait PushTokenSource: Send + Sync {
    /// Ask the runtime for permission to deliver push notifications.
    async fn request_permission(&self) -> bool;

    /// The token to deliver to, if one is known.
    async fn current_token(&self) -> Option<String>;

    /// Obtain a fresh token, replacing the current one.
    async fn refresh_token(&self) -> Result<String, AppError>;
}

/// Token source backed by a configured value (`DEVICE_PUSH_TOKEN`).
///
/// `refresh_token` does not contact any provider; it hands back the configured
/// token. Every foreground transition therefore counts as a successful refresh
/// in `token_health` while a token is set, and as an expired token while none is.
#[derive(Debug, Default)]
pub struct StaticTokenSource {
    token: RwLock<Option<String>>,
}

impl StaticTokenSource {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }
}

#[async_trait]
impl PushTokenSource for StaticTokenSource {
    async fn request_permission(&self) -> bool {
        self.token.read().await.is_some()
    }

    async fn current_token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    async fn refresh_token(&self) -> Result<String, AppError> {
        self.token
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::Config("no device push token configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_refresh_without_token_fails() {
        let source = StaticTokenSource::new(None);
        assert!(!source.request_permission().await);
        assert!(source.refresh_token().await.is_err());

        source.set_token(Some("device-token".into())).await;
        assert_eq!(source.refresh_token().await.unwrap(), "device-token");
    }

    #[tokio::test]
    async fn test_refresh_returns_configured_token_unchanged() {
        let source = StaticTokenSource::new(Some("device-token".into()));

        for _ in 0..3 {
            assert_eq!(source.refresh_token().await.unwrap(), "device-token");
        }
        assert_eq!(source.current_token().await.as_deref(), Some("device-token"));
    }
}
