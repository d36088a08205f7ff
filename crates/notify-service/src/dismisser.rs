//! Dismiss signal emission and reception.
//!
//! A dismiss travels the bus as a sessionless signal `(messageId, appId)`
//! on the Dismisser interface. Producers emit it from a fixed object path;
//! consumers relaying a dismiss emit it from a transient per-message path
//! so parallel dismissals never collide.

use std::sync::{Arc, Weak};

use notify_bus::{Bus, BusError, HandlerId, Message, SerialNumber, SignalSpec};
use notify_wire::{Arg, consts};
use tracing::{debug, warn};

use crate::error::ServiceError;
use crate::task_queue::TaskQueue;
use crate::transport::Transport;

/// Emits Dismiss signals from one object path.
pub struct DismisserSender {
    bus: Arc<dyn Bus>,
    spec: SignalSpec,
}

impl DismisserSender {
    pub fn new(bus: Arc<dyn Bus>, path: impl Into<String>) -> Self {
        Self {
            bus,
            spec: SignalSpec::new(
                path,
                consts::DISMISSER_INTERFACE_NAME,
                consts::DISMISS_SIGNAL_NAME,
            ),
        }
    }

    /// Broadcast a sessionless Dismiss signal for `(message_id, app_id)`.
    pub fn send_signal(&self, message_id: i32, app_id: &[u8]) -> Result<SerialNumber, BusError> {
        let args = [Arg::I32(message_id), Arg::Bytes(app_id.to_vec())];
        self.bus.send_signal(&self.spec, &args, consts::TTL_MAX, true)
    }
}

/// Broadcast a Dismiss signal from a transient per-message object path.
///
/// The path encodes the app id and message id, mirroring what other
/// dismissers on the bus emit for the same message.
pub fn send_transient_dismiss(
    bus: &Arc<dyn Bus>,
    message_id: i32,
    app_id: &[u8],
) -> Result<(), BusError> {
    let path = format!(
        "{}/{}/{}",
        consts::DISMISSER_PATH,
        hex::encode_upper(app_id),
        message_id.unsigned_abs()
    );
    let sender = DismisserSender::new(bus.clone(), path);
    let serial = sender.send_signal(message_id, app_id)?;
    debug!(message_id, serial, "dismiss signal sent");
    Ok(())
}

/// Receives Dismiss signals and forwards them to the transport.
///
/// The bus handler only enqueues; decoding and callback dispatch happen on
/// the receiver's own worker thread.
pub struct DismisserReceiver {
    bus: Arc<dyn Bus>,
    handler: HandlerId,
    queue: TaskQueue<Message>,
}

impl DismisserReceiver {
    pub fn start(bus: Arc<dyn Bus>, transport: Weak<Transport>) -> Result<Self, ServiceError> {
        let queue = TaskQueue::start("dismisser-recv", move |msg: Message| {
            let Some(transport) = transport.upgrade() else {
                return;
            };
            match decode_dismiss(&msg.args) {
                Ok((message_id, app_id)) => transport.on_dismiss(message_id, app_id),
                Err(error) => {
                    warn!(sender = %msg.sender, %error, "dropping malformed dismiss signal")
                }
            }
        });

        let enqueue = queue.handle();
        let handler = bus.register_signal_handler(
            consts::DISMISSER_INTERFACE_NAME,
            consts::DISMISS_SIGNAL_NAME,
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
            warn!(%error, "failed to unregister dismiss handler");
        }
    }
}

fn decode_dismiss(args: &[Arg]) -> Result<(i32, String), notify_wire::WireError> {
    if args.len() != consts::DISMISSER_NUM_PARAMS {
        return Err(notify_wire::WireError::WrongArity {
            got: args.len(),
            expected: consts::DISMISSER_NUM_PARAMS,
        });
    }
    let message_id = args[0].as_i32("messageId")?;
    let app_id = args[1].as_bytes("appId")?;
    if app_id.len() != consts::UUID_LENGTH {
        return Err(notify_wire::WireError::InvalidAppIdLength(app_id.len()));
    }
    Ok((message_id, hex::encode_upper(app_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_dismiss_accepts_well_formed_args() {
        let args = [Arg::I32(-77), Arg::Bytes(vec![0xAB; 16])];
        let (id, app_id) = decode_dismiss(&args).unwrap();
        assert_eq!(id, -77);
        assert_eq!(app_id, "AB".repeat(16));
    }

    #[test]
    fn decode_dismiss_rejects_short_app_id() {
        let args = [Arg::I32(1), Arg::Bytes(vec![0xAB; 4])];
        assert!(decode_dismiss(&args).is_err());
    }

    #[test]
    fn decode_dismiss_rejects_wrong_arity() {
        assert!(decode_dismiss(&[Arg::I32(1)]).is_err());
    }
}
