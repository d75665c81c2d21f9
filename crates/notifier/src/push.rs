//! Push provider HTTP client.

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use herald_common::error::AppError;
use herald_common::retry::{TimeoutPolicy, with_timeout_retry};
use herald_common::types::NotificationPayload;

#[derive(Debug, Serialize)]
struct PushMessage<'a> {
    to: &'a str,
    title: &'a str,
    body: &'a str,
    data: &'a serde_json::Map<String, Value>,
}

/// Provider response for an accepted message.
#[derive(Debug, Clone, PartialEq)]
pub struct PushReceipt {
    pub status: u16,
    /// Provider-level errors reported alongside a 2xx status
    pub provider_errors: Vec<Value>,
}

pub struct PushClient {
    http_client: Client,
    api_url: String,
    access_token: String,
    policy: TimeoutPolicy,
}

impl PushClient {
    pub fn new(api_url: impl Into<String>, access_token: impl Into<String>, policy: TimeoutPolicy) -> Self {
        Self {
            http_client: Client::new(),
            api_url: api_url.into(),
            access_token: access_token.into(),
            policy,
        }
    }

    /// Deliver `payload` to the device identified by `token`.
    ///
    /// Transport errors and timeouts are retried with backoff; an error status
    /// from the provider is returned as [`AppError::Delivery`] straight away.
    pub async fn send(&self, token: &str, payload: &NotificationPayload) -> Result<PushReceipt, AppError> {
        with_timeout_retry("push delivery", self.policy, move || self.send_once(token, payload)).await
    }

    async fn send_once(&self, token: &str, payload: &NotificationPayload) -> Result<PushReceipt, AppError> {
        let message = PushMessage {
            to: token,
            title: &payload.title,
            body: &payload.body,
            data: &payload.data,
        };

        let response = self
            .http_client
            .post(&self.api_url)
            .bearer_auth(&self.access_token)
            .json(&message)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let body: Option<Value> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let mut message = format!(
                "Push provider returned {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            );
            if let Some(body) = &body {
                message.push_str(&format!(": {}", body));
            }
            return Err(AppError::Delivery(message));
        }

        let provider_errors = body
            .as_ref()
            .and_then(|b| b.get("errors"))
            .and_then(|e| e.as_array())
            .cloned()
            .unwrap_or_default();

        if !provider_errors.is_empty() {
            tracing::warn!(
                status = status.as_u16(),
                errors = %serde_json::Value::Array(provider_errors.clone()),
                "Push provider accepted message with errors"
            );
        }

        Ok(PushReceipt {
            status: status.as_u16(),
            provider_errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use herald_common::types::NotificationType;
    use wiremock::matchers::{body_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn payload() -> NotificationPayload {
        NotificationPayload {
            kind: NotificationType::Push,
            title: "Markets close higher".to_string(),
            body: "Tech stocks lead the rally".to_string(),
            deep_link: None,
            data: serde_json::json!({ "section": "business" })
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    fn client(server: &MockServer) -> PushClient {
        PushClient::new(
            server.uri(),
            "access-token",
            TimeoutPolicy {
                timeout: Duration::from_secs(2),
                retries: 0,
                backoff: Duration::from_millis(10),
            },
        )
    }

    #[tokio::test]
    async fn test_send_posts_message_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer access-token"))
            .and(body_json(serde_json::json!({
                "to": "device-1",
                "title": "Markets close higher",
                "body": "Tech stocks lead the rally",
                "data": { "section": "business" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "m1" })))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = client(&server).send("device-1", &payload()).await.unwrap();
        assert_eq!(receipt.status, 200);
        assert!(receipt.provider_errors.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_includes_code_reason_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(serde_json::json!({ "error": "maintenance" })),
            )
            .mount(&server)
            .await;

        let err = client(&server).send("device-1", &payload()).await.unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, AppError::Delivery(_)));
        assert!(message.contains("503"));
        assert!(message.contains("Service Unavailable"));
        assert!(message.contains("maintenance"));
    }

    #[tokio::test]
    async fn test_provider_errors_on_success_are_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errors": [{ "code": "DeviceNotRegistered" }]
            })))
            .mount(&server)
            .await;

        let receipt = client(&server).send("device-1", &payload()).await.unwrap();
        assert_eq!(receipt.provider_errors.len(), 1);
    }
}
