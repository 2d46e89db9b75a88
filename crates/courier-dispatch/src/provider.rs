//! External provider client.
//!
//! The provider exposes a single operation: accept a notification for
//! delivery. Any response other than 202 Accepted with a decodable receipt
//! body counts as a send failure; classifying the failure further is not the
//! worker's job.

use std::time::Duration;

use async_trait::async_trait;
use courier_core::Notification;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DispatchError, Result};

/// JSON body posted to the external provider.
#[derive(Debug, Serialize)]
pub struct SendPayload<'a> {
    /// Destination address.
    pub to: &'a str,
    /// Delivery channel name.
    pub channel: &'a str,
    /// Message body.
    pub content: &'a str,
}

/// Provider's 202 Accepted response body.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderReceipt {
    /// Provider-assigned message identifier.
    #[serde(rename = "messageId")]
    pub message_id: String,
    /// Provider-side status string.
    pub status: String,
    /// Provider-side acceptance timestamp.
    pub timestamp: String,
}

/// Delivery to an external notification service.
///
/// Test doubles implement this trait to script provider behaviour without
/// real HTTP calls.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Submits one notification. Success means the provider accepted it.
    async fn send(&self, notification: &Notification) -> Result<ProviderReceipt>;
}

/// Provider that POSTs notifications to a configured webhook URL.
pub struct WebhookProvider {
    base_url: String,
    client: reqwest::Client,
}

impl WebhookProvider {
    /// Creates a provider with a per-call timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url: base_url.into(), client })
    }
}

#[async_trait]
impl Provider for WebhookProvider {
    async fn send(&self, notification: &Notification) -> Result<ProviderReceipt> {
        let payload = SendPayload {
            to: &notification.recipient,
            channel: notification.channel.as_str(),
            content: &notification.content,
        };

        let response = self.client.post(&self.base_url).json(&payload).send().await?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            return Err(DispatchError::UnexpectedStatus { status: status.as_u16() });
        }

        let receipt: ProviderReceipt = response.json().await?;
        debug!(
            notification_id = %notification.id,
            provider_msg_id = %receipt.message_id,
            "provider accepted notification"
        );

        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use courier_core::{Channel, NotificationId, Priority, Status};
    use wiremock::{
        matchers::{body_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn notification() -> Notification {
        let now = Utc::now();
        Notification {
            id: NotificationId::new(),
            batch_id: None,
            channel: Channel::Sms,
            recipient: "+905551234567".to_string(),
            content: "Hello".to_string(),
            priority: Priority::Normal,
            status: Status::Processing,
            idempotency_key: None,
            retry_count: 0,
            max_retries: 3,
            next_retry_at: None,
            scheduled_at: None,
            sent_at: None,
            provider_msg_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn accepted_response_yields_receipt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_json(serde_json::json!({
                "to": "+905551234567",
                "channel": "sms",
                "content": "Hello",
            })))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
                "messageId": "abc",
                "status": "accepted",
                "timestamp": "2026-01-01T00:00:00Z",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = WebhookProvider::new(server.uri(), Duration::from_secs(5))
            .expect("provider builds");
        let receipt = provider.send(&notification()).await.expect("send succeeds");

        assert_eq!(receipt.message_id, "abc");
        assert_eq!(receipt.status, "accepted");
        server.verify().await;
    }

    #[tokio::test]
    async fn non_accepted_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let provider = WebhookProvider::new(server.uri(), Duration::from_secs(5))
            .expect("provider builds");
        let err = provider.send(&notification()).await.unwrap_err();

        assert!(matches!(err, DispatchError::UnexpectedStatus { status: 500 }));
    }

    #[tokio::test]
    async fn ok_is_not_accepted() {
        // Even a 2xx other than 202 violates the provider contract.
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messageId": "abc",
                "status": "ok",
                "timestamp": "2026-01-01T00:00:00Z",
            })))
            .mount(&server)
            .await;

        let provider = WebhookProvider::new(server.uri(), Duration::from_secs(5))
            .expect("provider builds");
        let err = provider.send(&notification()).await.unwrap_err();

        assert!(matches!(err, DispatchError::UnexpectedStatus { status: 200 }));
    }

    #[tokio::test]
    async fn undecodable_receipt_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202).set_body_string("not json"))
            .mount(&server)
            .await;

        let provider = WebhookProvider::new(server.uri(), Duration::from_secs(5))
            .expect("provider builds");
        assert!(provider.send(&notification()).await.is_err());
    }
}
