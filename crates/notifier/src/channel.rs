//! Delivery channels for order notifications.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use ecomm_common::types::NotificationEvent;

/// Errors a delivery attempt can end with.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Send timed out after {0:?}")]
    Timeout(Duration),
}

/// A rendered notification, ready to hand to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    /// Render the message for a queued event.
    pub fn for_event(event: &NotificationEvent, subject: &str) -> Self {
        Self {
            to: event.user_email.clone(),
            subject: subject.to_string(),
            body: format!("Order {} is {}", event.order_id, event.order_status),
        }
    }
}

/// Trait for notification delivery channels.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Channel name, for logs.
    fn name(&self) -> &str;

    /// Deliver one message. Any error counts as a failed attempt.
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError>;
}

/// Email delivery through the Resend HTTP API.
pub struct ResendChannel {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl ResendChannel {
    pub fn new(api_url: String, api_key: String, from: String) -> Self {
        Self {
            client: Client::new(),
            api_url,
            api_key,
            from,
        }
    }

    fn build_payload(&self, message: &EmailMessage) -> serde_json::Value {
        json!({
            "from": self.from,
            "to": [message.to],
            "subject": message.subject,
            "text": message.body,
        })
    }
}

#[async_trait]
impl DeliveryChannel for ResendChannel {
    fn name(&self) -> &str {
        "resend"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&self.build_payload(message))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(to = %message.to, "Email accepted by Resend");
        Ok(())
    }
}

/// Logs messages instead of sending them. Used when no email provider is
/// configured.
#[derive(Debug, Default)]
pub struct LogChannel;

#[async_trait]
impl DeliveryChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "Notification email (log channel)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ecomm_common::types::OrderStatus;

    fn event() -> NotificationEvent {
        NotificationEvent {
            id: 11,
            user_email: "buyer@example.com".to_string(),
            order_status: OrderStatus::Shipped,
            order_id: 42,
            state_id: 7,
            attempts: 0,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_message_renders_order_and_status() {
        let message = EmailMessage::for_event(&event(), "email from ecomm");
        assert_eq!(message.to, "buyer@example.com");
        assert_eq!(message.subject, "email from ecomm");
        assert_eq!(message.body, "Order 42 is shipped");
    }

    #[test]
    fn test_resend_payload_shape() {
        let channel = ResendChannel::new(
            "https://api.resend.com/emails".to_string(),
            "re_test".to_string(),
            "shop@example.com".to_string(),
        );
        let message = EmailMessage::for_event(&event(), "Your order");
        let payload = channel.build_payload(&message);

        assert_eq!(payload["from"], "shop@example.com");
        assert_eq!(payload["to"], json!(["buyer@example.com"]));
        assert_eq!(payload["subject"], "Your order");
        assert_eq!(payload["text"], "Order 42 is shipped");
    }

    #[test]
    fn test_rejected_error_carries_status() {
        let err = DeliveryError::Rejected {
            status: 422,
            body: "invalid to".to_string(),
        };
        assert_eq!(err.to_string(), "Provider rejected message (422): invalid to");
    }

    #[tokio::test]
    async fn test_log_channel_always_succeeds() {
        let message = EmailMessage::for_event(&event(), "subject");
        assert!(LogChannel.send(&message).await.is_ok());
    }
}
