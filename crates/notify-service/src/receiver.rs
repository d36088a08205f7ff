//! Consumer-facing callback contract and the received-notification handle.

use std::ops::Deref;

use notify_wire::Notification;
use tracing::debug;

use crate::dismiss::DismissTask;
use crate::task_queue::QueueHandle;

/// Application callback registered through `init_receive`.
///
/// Both methods run on the service's worker threads, never on the bus
/// dispatch thread. They should return promptly; long work belongs on the
/// application's own threads.
pub trait NotificationReceiver: Send + Sync {
    /// A notification arrived.
    fn receive(&self, notification: ReceivedNotification);

    /// Some consumer dismissed the message `(message_id, app_id)`; drop it
    /// from any UI still showing it.
    fn dismiss(&self, message_id: i32, app_id: &str);
}

/// A notification as delivered to the receiver callback.
///
/// Wraps the decoded [`Notification`] together with the dismiss queue
/// handle so that [`dismiss`](Self::dismiss) can hand the round trip to
/// the background worker.
pub struct ReceivedNotification {
    notification: Notification,
    dismiss_queue: QueueHandle<DismissTask>,
}

impl ReceivedNotification {
    pub(crate) fn new(notification: Notification, dismiss_queue: QueueHandle<DismissTask>) -> Self {
        Self {
            notification,
            dismiss_queue,
        }
    }

    pub fn notification(&self) -> &Notification {
        &self.notification
    }

    pub fn into_notification(self) -> Notification {
        self.notification
    }

    /// Dismiss this message: notify the producer that created it and every
    /// other producer still holding it pending.
    ///
    /// Fire-and-forget: this only enqueues a task and returns
    /// immediately; the session join and method call happen on the dismiss
    /// worker, and their failures are logged, not reported back.
    pub fn dismiss(&self) {
        let task = DismissTask {
            original_sender: self.notification.original_sender.clone().unwrap_or_default(),
            message_id: self.notification.message_id,
            app_id: self.notification.app_id.clone().unwrap_or_default(),
        };
        debug!(
            message_id = task.message_id,
            original_sender = %task.original_sender,
            "dismiss enqueued"
        );
        self.dismiss_queue.enqueue(task);
    }
}

impl Deref for ReceivedNotification {
    type Target = Notification;

    fn deref(&self) -> &Notification {
        &self.notification
    }
}
