//! Producer-side Dismiss method endpoint.
//!
//! Consumers dismissing a message join a session to the producer and call
//! `Dismiss(messageId)`. The method reply is sent immediately; cancelling
//! the pending sessionless signal and re-broadcasting the dismiss happen
//! afterwards on a worker thread, so the caller never waits on them.

use std::sync::{Arc, Weak};

use notify_bus::{Bus, BusError, HandlerId};
use notify_wire::{Arg, consts};
use tracing::warn;

use crate::error::ServiceError;
use crate::task_queue::TaskQueue;
use crate::transport::Transport;

pub struct ProducerReceiver {
    bus: Arc<dyn Bus>,
    handler: HandlerId,
    queue: TaskQueue<i32>,
}

impl ProducerReceiver {
    pub fn start(bus: Arc<dyn Bus>, transport: Weak<Transport>) -> Result<Self, ServiceError> {
        let queue = TaskQueue::start("producer-recv", move |message_id: i32| {
            let Some(transport) = transport.upgrade() else {
                return;
            };
            transport.on_producer_dismiss(message_id);
        });

        let enqueue = queue.handle();
        let handler = bus.add_method_handler(
            consts::PRODUCER_PATH,
            consts::PRODUCER_INTERFACE_NAME,
            consts::DISMISS_METHOD_NAME,
            Arc::new(move |args: &[Arg]| {
                let message_id = match args {
                    [arg] => arg
                        .as_i32("messageId")
                        .map_err(|e| BusError::invalid_args(e.to_string()))?,
                    _ => {
                        return Err(BusError::invalid_args(format!(
                            "Dismiss expects 1 argument, got {}",
                            args.len()
                        )));
                    }
                };
                if !enqueue.enqueue(message_id) {
                    warn!(message_id, "producer receiver stopping, dismiss dropped");
                }
                // Reply before the cancellation work runs.
                Ok(Vec::new())
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
        if let Err(error) = self.bus.remove_method_handler(self.handler) {
            warn!(%error, "failed to remove Dismiss method handler");
        }
    }
}
