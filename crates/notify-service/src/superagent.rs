//! SuperAgent discovery and reception.
//!
//! A SuperAgent aggregates notifications from many producers and re-emits
//! them on its own interface. Consumers prefer a single SuperAgent feed to
//! a broadcast fan-in: the first SuperAgent signal (or announcement)
//! triggers advertised-name discovery of that agent, and once it is found
//! the transport collapses its broadcast subscriptions down to one rule
//! scoped to the agent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use notify_bus::{AnnounceListener, Bus, BusListener, HandlerId, Message};
use notify_wire::{codec, consts};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::ServiceError;
use crate::task_queue::TaskQueue;
use crate::transport::Transport;

/// Receives notify signals on the SuperAgent interface.
pub struct SuperAgentTransport {
    bus: Arc<dyn Bus>,
    handler: HandlerId,
    queue: TaskQueue<Message>,
    first: Arc<AtomicBool>,
}

impl SuperAgentTransport {
    pub fn start(bus: Arc<dyn Bus>, transport: Weak<Transport>) -> Result<Self, ServiceError> {
        let decode_transport = transport.clone();
        let queue = TaskQueue::start("superagent-recv", move |msg: Message| {
            let Some(transport) = decode_transport.upgrade() else {
                return;
            };
            match codec::decode(&msg.args, &msg.sender) {
                Ok(notification) => transport.on_received_notification(notification),
                Err(error) => {
                    warn!(sender = %msg.sender, %error, "dropping malformed superagent notification")
                }
            }
        });

        let first = Arc::new(AtomicBool::new(true));
        let first_flag = first.clone();
        let enqueue = queue.handle();
        let handler = bus.register_signal_handler(
            consts::SUPERAGENT_INTERFACE_NAME,
            consts::NOTIFY_SIGNAL_NAME,
            Arc::new(move |msg: &Message| {
                if first_flag.swap(false, Ordering::SeqCst) {
                    debug!(sender = %msg.sender, "first superagent signal, starting discovery");
                    if let Some(transport) = transport.upgrade() {
                        if let Err(error) = transport.find_super_agent(&msg.sender) {
                            warn!(sender = %msg.sender, %error, "superagent discovery failed");
                            first_flag.store(true, Ordering::SeqCst);
                        }
                    }
                }
                enqueue.enqueue(msg.clone());
            }),
        )?;

        Ok(Self {
            bus,
            handler,
            queue,
            first,
        })
    }

    /// Re-arm (or disarm) the first-signal discovery trigger.
    pub fn set_first(&self, first: bool) {
        self.first.store(first, Ordering::SeqCst);
    }

    pub fn unregister(mut self) {
        self.queue.stop();
        if let Err(error) = self.bus.unregister_signal_handler(self.handler) {
            warn!(%error, "failed to unregister superagent handler");
        }
    }
}

/// Reacts to the discovered agent appearing or disappearing.
pub struct SuperAgentBusListener {
    transport: Weak<Transport>,
    expected: Mutex<Option<String>>,
}

impl SuperAgentBusListener {
    pub fn new(transport: Weak<Transport>) -> Self {
        Self {
            transport,
            expected: Mutex::new(None),
        }
    }

    /// Record the bus name discovery was started for.
    pub fn set_expected(&self, name: &str) {
        *self.expected.lock() = Some(name.to_owned());
    }
}

impl BusListener for SuperAgentBusListener {
    fn found_advertised_name(&self, name: &str) {
        if self.expected.lock().as_deref() != Some(name) {
            return;
        }
        let Some(transport) = self.transport.upgrade() else {
            return;
        };
        if let Err(error) = transport.listen_to_super_agent(name) {
            warn!(%name, %error, "failed to switch to superagent");
        }
    }

    fn lost_advertised_name(&self, name: &str) {
        let Some(transport) = self.transport.upgrade() else {
            return;
        };
        if let Err(error) = transport.cancel_listen_to_super_agent(name) {
            warn!(%name, %error, "failed to fall back from superagent");
        }
    }
}

/// Starts discovery when a peer announces the SuperAgent interface.
pub struct SuperAgentAnnounceListener {
    transport: Weak<Transport>,
}

impl SuperAgentAnnounceListener {
    pub fn new(transport: Weak<Transport>) -> Self {
        Self { transport }
    }
}

impl AnnounceListener for SuperAgentAnnounceListener {
    fn announced(&self, bus_name: &str, object_description: &[(String, Vec<String>)]) {
        let implements_superagent = object_description
            .iter()
            .any(|(_, interfaces)| interfaces.iter().any(|i| i == consts::SUPERAGENT_INTERFACE_NAME));
        if !implements_superagent {
            return;
        }
        let Some(transport) = self.transport.upgrade() else {
            return;
        };
        debug!(%bus_name, "superagent announced");
        if let Err(error) = transport.find_super_agent(bus_name) {
            warn!(%bus_name, %error, "superagent discovery failed");
        }
    }
}
