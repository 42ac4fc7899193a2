use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::identity::models::Notification;

/// Serializable representation of an outbound notification.
///
/// Infrastructure representation posted to the mail webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub message_id: String,
    pub template: String,
    pub recipient: String,
    pub user_id: Option<String>,
    pub confirmation_url: Option<String>,
    pub code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Notification> for NotificationMessage {
    fn from(notification: &Notification) -> Self {
        Self {
            message_id: Uuid::now_v7().to_string(),
            template: notification.template.as_str().to_string(),
            recipient: notification.recipient.as_str().to_string(),
            user_id: notification.user_id.map(|id| id.to_string()),
            confirmation_url: notification.confirmation_url.clone(),
            code: notification.display_code.clone(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::models::EmailAddress;
    use crate::domain::identity::models::NotificationTemplate;
    use crate::domain::identity::models::UserId;

    #[test]
    fn test_message_serializes_template_name() {
        let user_id = UserId::new();
        let notification = Notification {
            template: NotificationTemplate::PasswordReset,
            recipient: EmailAddress::new("alice@example.com").unwrap(),
            user_id: Some(user_id),
            confirmation_url: Some("https://app.example.com/auth/reset-password?token=t".into()),
            display_code: Some("123456".into()),
        };

        let json = serde_json::to_value(NotificationMessage::from(&notification)).unwrap();

        assert_eq!(json["template"], "password_reset");
        assert_eq!(json["recipient"], "alice@example.com");
        assert_eq!(json["user_id"], user_id.to_string());
        assert_eq!(json["code"], "123456");
    }
}
