//! The asynchronous dismiss round trip.
//!
//! `ReceivedNotification::dismiss()` must never block its caller, so the
//! whole sequence — join a session with the originating producer, invoke
//! its `Dismiss` method, broadcast the sessionless Dismiss signal, leave
//! the session — runs on the dismiss worker, one task at a time. Every
//! failure here is log-only: the dismissing caller already returned.

use std::sync::Arc;

use notify_bus::{Bus, SessionId};
use notify_wire::Arg;
use notify_wire::consts;
use tracing::{debug, warn};

use crate::dismisser::send_transient_dismiss;

/// One queued dismiss request, consumed exactly once by the worker.
#[derive(Debug, Clone)]
pub struct DismissTask {
    /// Bus name of the producer that created the notification.
    pub original_sender: String,
    pub message_id: i32,
    /// Uppercase hex app id, as carried by the notification.
    pub app_id: String,
}

/// Proxy for the producer-facing `Dismiss` method.
pub struct ProducerSender {
    bus: Arc<dyn Bus>,
}

impl ProducerSender {
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self { bus }
    }

    pub fn dismiss(
        &self,
        peer: &str,
        session: SessionId,
        message_id: i32,
    ) -> Result<(), notify_bus::BusError> {
        self.bus
            .method_call(
                peer,
                session,
                consts::PRODUCER_INTERFACE_NAME,
                consts::DISMISS_METHOD_NAME,
                &[Arg::I32(message_id)],
            )
            .map(|_| ())
    }
}

/// Process one dismiss task on the worker thread.
///
/// The session join and method call are best-effort; the broadcast Dismiss
/// signal is always attempted so producers holding the message pending
/// drop it even when the direct call could not be delivered.
pub fn process_dismiss(bus: &Arc<dyn Bus>, task: &DismissTask) {
    let mut session = None;
    if task.original_sender.is_empty() {
        warn!(
            message_id = task.message_id,
            "no original sender in the message, skipping direct dismiss"
        );
    } else {
        match bus.join_session(&task.original_sender, consts::PRODUCER_SERVICE_PORT) {
            Ok(id) => {
                debug!(
                    original_sender = %task.original_sender,
                    session = id.0,
                    "joined producer session"
                );
                session = Some(id);
            }
            Err(error) => {
                warn!(
                    original_sender = %task.original_sender,
                    %error,
                    "failed to join producer session"
                );
            }
        }
    }

    if let Some(id) = session {
        let producer = ProducerSender::new(bus.clone());
        match producer.dismiss(&task.original_sender, id, task.message_id) {
            Ok(()) => debug!(message_id = task.message_id, "direct dismiss succeeded"),
            Err(error) => {
                warn!(message_id = task.message_id, %error, "direct dismiss failed")
            }
        }
    }

    match hex::decode(&task.app_id) {
        Ok(app_id) => {
            if let Err(error) = send_transient_dismiss(bus, task.message_id, &app_id) {
                warn!(message_id = task.message_id, %error, "dismiss broadcast failed");
            }
        }
        Err(error) => {
            warn!(app_id = %task.app_id, %error, "app id is not valid hex, dismiss broadcast skipped");
        }
    }

    if let Some(id) = session {
        if let Err(error) = bus.leave_session(id) {
            warn!(session = id.0, %error, "failed to leave producer session");
        }
    }
}
