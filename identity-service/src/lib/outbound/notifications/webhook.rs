use std::time::Duration;

use async_trait::async_trait;

use crate::domain::identity::models::Notification;
use crate::identity::errors::MailerError;
use crate::identity::ports::Mailer;
use crate::outbound::notifications::messages::NotificationMessage;

/// Delivers notifications by POSTing them as JSON to a mail relay.
pub struct WebhookMailer {
    http: reqwest::Client,
    url: String,
}

impl WebhookMailer {
    pub fn new(url: &str) -> Result<Self, anyhow::Error> {
        let url = url::Url::parse(url)?.to_string();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        tracing::info!(url = %url, "Webhook mailer initialized");

        Ok(Self { http, url })
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn deliver(&self, notification: &Notification) -> Result<(), MailerError> {
        let message = NotificationMessage::from(notification);

        let response = self
            .http
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .map_err(|e| MailerError::DeliveryFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MailerError::DeliveryFailed(format!(
                "mail relay returned HTTP {}",
                response.status()
            )));
        }

        tracing::debug!(
            message_id = %message.message_id,
            template = %message.template,
            "Notification delivered"
        );

        Ok(())
    }
}

/// Fallback used when no relay is configured: logs instead of sending.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn deliver(&self, notification: &Notification) -> Result<(), MailerError> {
        let message = serde_json::to_string(&NotificationMessage::from(notification))
            .map_err(|e| MailerError::SerializationFailed(e.to_string()))?;

        tracing::info!(
            template = notification.template.as_str(),
            recipient = %notification.recipient,
            payload = %message,
            "Notification not sent, no mail relay configured"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_webhook_url_is_rejected() {
        assert!(WebhookMailer::new("not a url").is_err());
    }
}
