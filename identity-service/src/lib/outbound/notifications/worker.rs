//! Bounded background delivery for outbound notifications.
//!
//! Callers enqueue with [`QueuedNotificationDispatcher::dispatch`], which never
//! waits: a full or closed queue drops the message with a warning. A single
//! worker task drains the queue through a [`Mailer`] and logs failures.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::domain::identity::models::Notification;
use crate::identity::ports::Mailer;
use crate::identity::ports::NotificationDispatcher;

#[derive(Clone)]
pub struct QueuedNotificationDispatcher {
    sender: mpsc::Sender<Notification>,
}

impl NotificationDispatcher for QueuedNotificationDispatcher {
    fn dispatch(&self, notification: Notification) {
        match self.sender.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => tracing::warn!(
                template = dropped.template.as_str(),
                recipient = %dropped.recipient,
                user_id = ?dropped.user_id,
                "Notification queue full, message dropped"
            ),
            Err(TrySendError::Closed(dropped)) => tracing::warn!(
                template = dropped.template.as_str(),
                recipient = %dropped.recipient,
                user_id = ?dropped.user_id,
                "Notification queue closed, message dropped"
            ),
        }
    }
}

/// Handle to the delivery task.
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) also
/// stops the worker after it drains what is already queued.
pub struct NotificationWorker {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl NotificationWorker {
    /// Start the worker on the current runtime.
    pub fn spawn(
        mailer: Arc<dyn Mailer>,
        capacity: usize,
    ) -> (QueuedNotificationDispatcher, NotificationWorker) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (shutdown, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(run(mailer, receiver, shutdown_rx));
        tracing::info!(capacity = capacity.max(1), "Notification worker started");

        (
            QueuedNotificationDispatcher { sender },
            NotificationWorker { shutdown, handle },
        )
    }

    /// Stop accepting messages, deliver what is queued, and wait for the task to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());

        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Notification worker terminated abnormally");
            return;
        }

        tracing::info!("Notification worker stopped");
    }
}

async fn run(
    mailer: Arc<dyn Mailer>,
    mut receiver: mpsc::Receiver<Notification>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            next = receiver.recv() => match next {
                Some(notification) => deliver(mailer.as_ref(), notification).await,
                None => return,
            },
        }
    }

    receiver.close();
    while let Some(notification) = receiver.recv().await {
        deliver(mailer.as_ref(), notification).await;
    }
}

async fn deliver(mailer: &dyn Mailer, notification: Notification) {
    if let Err(e) = mailer.deliver(&notification).await {
        tracing::error!(
            error = %e,
            template = notification.template.as_str(),
            recipient = %notification.recipient,
            user_id = ?notification.user_id,
            "Failed to deliver notification"
        );
    }
}
