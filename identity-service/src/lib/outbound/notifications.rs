pub mod messages;
pub mod webhook;
pub mod worker;

pub use webhook::WebhookMailer;
pub use worker::NotificationWorker;
pub use worker::QueuedNotificationDispatcher;
