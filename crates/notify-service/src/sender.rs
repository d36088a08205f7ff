//! Producer-facing send handle.

use std::sync::Arc;

use notify_wire::{MessageIdGenerator, MessageType, Notification, codec, consts};
use tracing::info;

use crate::error::ServiceError;
use crate::identity::PropertyStore;
use crate::transport::Transport;

/// Sends notifications through a started sender transport.
///
/// Handed out by `NotificationService::init_send`. Identity arguments are
/// re-read from the property store on every send, so device renames show
/// up without restarting the service.
pub struct NotificationSender {
    transport: Arc<Transport>,
    store: Arc<dyn PropertyStore>,
    ids: MessageIdGenerator,
}

impl NotificationSender {
    pub(crate) fn new(transport: Arc<Transport>, store: Arc<dyn PropertyStore>) -> Self {
        Self {
            transport,
            store,
            ids: MessageIdGenerator::new(),
        }
    }

    /// Send `notification` with the given TTL (seconds, within the
    /// protocol bounds) and return the message id it was assigned.
    pub fn send(&self, notification: &Notification, ttl: u16) -> Result<i32, ServiceError> {
        notify_wire::validate_ttl(ttl)?;
        let bus = self
            .transport
            .current_bus()
            .ok_or(ServiceError::SenderNotStarted)?;
        let properties = self.store.read_all()?;
        let identity = codec::IdentityArgs::from_properties(&properties)?;
        let original_sender = bus.unique_name();
        let message_id = self.ids.next_id();
        let args = codec::encode(
            consts::NOTIFICATION_SERVICE_VERSION,
            message_id,
            notification.message_type,
            &notification.text,
            &notification.custom_attributes,
            &notification.rich,
            &original_sender,
            &identity,
        )?;
        self.transport.set_app_id(identity.app_id_bytes().to_vec());
        self.transport
            .send_notification(notification.message_type, &args, ttl)?;
        info!(
            message_id,
            message_type = %notification.message_type,
            ttl,
            "notification sent"
        );
        Ok(message_id)
    }

    /// Cancel the last notification sent with `message_type`, so consumers
    /// that have not yet fetched it never see it.
    pub fn delete_last_msg(&self, message_type: MessageType) -> Result<(), ServiceError> {
        self.transport.delete_last_msg(message_type)
    }
}
