//! Consumer-side notify signal reception.
//!
//! The bus handler clones the raw message and enqueues it; decoding and
//! the application callback run on the consumer's worker thread. Malformed
//! payloads are logged and dropped without disturbing the handler.

use std::sync::{Arc, Weak};

use notify_bus::{Bus, HandlerId, Message};
use notify_wire::{codec, consts};
use tracing::warn;

use crate::error::ServiceError;
use crate::task_queue::TaskQueue;
use crate::transport::Transport;

pub struct ConsumerTransport {
    bus: Arc<dyn Bus>,
    handler: HandlerId,
    queue: TaskQueue<Message>,
}

impl ConsumerTransport {
    /// Register for notify signals on `interface` (the plain Notification
    /// interface, or the SuperAgent one for aggregated traffic).
    pub fn start(
        bus: Arc<dyn Bus>,
        interface: &str,
        transport: Weak<Transport>,
    ) -> Result<Self, ServiceError> {
        let queue = TaskQueue::start("consumer-recv", move |msg: Message| {
            let Some(transport) = transport.upgrade() else {
                return;
            };
            match codec::decode(&msg.args, &msg.sender) {
                Ok(notification) => transport.on_received_notification(notification),
                Err(error) => {
                    warn!(sender = %msg.sender, %error, "dropping malformed notification")
                }
            }
        });

        let enqueue = queue.handle();
        let handler = bus.register_signal_handler(
            interface,
            consts::NOTIFY_SIGNAL_NAME,
            Arc::new(move |msg: &Message| {
                enqueue.enqueue(msg.clone());
            }),
        )?;

        Ok(Self {
            bus,
            handler,
            queue,
        })
    }

    pub fn unregister(mut self) {
        self.queue.stop();
        if let Err(error) = self.bus.unregister_signal_handler(self.handler) {
            warn!(%error, "failed to unregister notify handler");
        }
    }
}
