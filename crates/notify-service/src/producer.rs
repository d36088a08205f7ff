//! Per-message-type producer slot.
//!
//! A producer keeps one slot per message type. Each slot remembers the
//! serial number and message id of the last notification it sent so a
//! later delete can cancel exactly that sessionless signal, and nothing
//! else.

use std::sync::Arc;

use notify_bus::{Bus, SignalSpec};
use notify_wire::consts;
use notify_wire::{Arg, MessageType};
use tracing::debug;

use crate::error::ServiceError;

pub struct ProducerTransport {
    spec: SignalSpec,
    last_serial: u32,
    last_message_id: i32,
}

impl ProducerTransport {
    /// A slot emitting from `/<type>` on the given interface. Relay
    /// producers pass the SuperAgent interface here; everything else is
    /// identical.
    pub fn new(message_type: MessageType, interface: &str) -> Self {
        let path = format!(
            "{}{}",
            consts::PRODUCER_SERVICE_PATH_PREFIX,
            message_type.path_name()
        );
        Self {
            spec: SignalSpec::new(path, interface, consts::NOTIFY_SIGNAL_NAME),
            last_serial: 0,
            last_message_id: 0,
        }
    }

    /// Emit an encoded notification as a sessionless signal, replacing
    /// whatever this slot last sent as its cancellation target.
    pub fn send_signal(
        &mut self,
        bus: &Arc<dyn Bus>,
        args: &[Arg],
        ttl: u16,
    ) -> Result<(), ServiceError> {
        let message_id = match args.get(1) {
            Some(arg) => arg.as_i32("messageId")?,
            None => {
                return Err(notify_wire::WireError::WrongArity {
                    got: args.len(),
                    expected: consts::NOTIFY_NUM_PARAMS,
                }
                .into());
            }
        };
        let serial = bus.send_signal(&self.spec, args, ttl, true)?;
        self.last_serial = serial;
        self.last_message_id = message_id;
        debug!(path = %self.spec.path, serial, message_id, "notification sent");
        Ok(())
    }

    /// Cancel the last notification this slot sent, whatever its id.
    pub fn delete_last_msg(&mut self, bus: &Arc<dyn Bus>) -> Result<(), ServiceError> {
        if self.last_serial == 0 {
            return Err(ServiceError::NothingToDelete);
        }
        bus.cancel_sessionless(self.last_serial)?;
        debug!(serial = self.last_serial, message_id = self.last_message_id, "last notification cancelled");
        self.last_serial = 0;
        self.last_message_id = 0;
        Ok(())
    }

    /// Cancel the last notification only if it carries `message_id`.
    pub fn delete_msg(&mut self, bus: &Arc<dyn Bus>, message_id: i32) -> Result<(), ServiceError> {
        if self.last_serial == 0 {
            return Err(ServiceError::NothingToDelete);
        }
        if self.last_message_id != message_id {
            return Err(ServiceError::NoSuchMessage { message_id });
        }
        bus.cancel_sessionless(self.last_serial)?;
        debug!(serial = self.last_serial, message_id, "notification cancelled");
        self.last_serial = 0;
        self.last_message_id = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify_bus::memory::MemoryNetwork;

    fn notify_args(message_id: i32) -> Vec<Arg> {
        vec![
            Arg::U16(consts::NOTIFICATION_SERVICE_VERSION),
            Arg::I32(message_id),
        ]
    }

    #[test]
    fn delete_msg_with_wrong_id_leaves_the_signal_pending() {
        let net = MemoryNetwork::new();
        let bus: Arc<dyn Bus> = net.connect();
        let mut slot = ProducerTransport::new(MessageType::Info, consts::NOTIFICATION_INTERFACE_NAME);
        slot.send_signal(&bus, &notify_args(42), 30).unwrap();

        let err = slot.delete_msg(&bus, 7).unwrap_err();
        assert!(matches!(err, ServiceError::NoSuchMessage { message_id: 7 }));
        assert_eq!(net.sessionless_snapshot().len(), 1);

        slot.delete_msg(&bus, 42).unwrap();
        assert!(net.sessionless_snapshot().is_empty());
    }

    #[test]
    fn delete_fails_on_an_empty_slot() {
        let net = MemoryNetwork::new();
        let bus: Arc<dyn Bus> = net.connect();
        let mut slot = ProducerTransport::new(MessageType::Warning, consts::NOTIFICATION_INTERFACE_NAME);

        assert!(matches!(
            slot.delete_last_msg(&bus),
            Err(ServiceError::NothingToDelete)
        ));
        assert!(matches!(
            slot.delete_msg(&bus, 1),
            Err(ServiceError::NothingToDelete)
        ));
    }

    #[test]
    fn delete_last_cancels_only_the_newest_send() {
        let net = MemoryNetwork::new();
        let bus: Arc<dyn Bus> = net.connect();
        let mut slot = ProducerTransport::new(MessageType::Emergency, consts::NOTIFICATION_INTERFACE_NAME);
        slot.send_signal(&bus, &notify_args(1), 30).unwrap();
        slot.send_signal(&bus, &notify_args(2), 30).unwrap();

        slot.delete_last_msg(&bus).unwrap();
        let pending = net.sessionless_snapshot();
        assert_eq!(pending.len(), 1);

        // The slot forgot the older send; it can no longer be deleted.
        assert!(matches!(
            slot.delete_msg(&bus, 1),
            Err(ServiceError::NothingToDelete)
        ));
    }
}
