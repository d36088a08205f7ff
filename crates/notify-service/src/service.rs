//! Top-level service handle.

use std::sync::Arc;

use notify_bus::Bus;
use notify_wire::consts;
use tracing::info;

use crate::error::ServiceError;
use crate::identity::PropertyStore;
use crate::receiver::NotificationReceiver;
use crate::sender::NotificationSender;
use crate::transport::Transport;

/// One notification service instance over one bus attachment.
///
/// A process usually creates exactly one, but nothing here is global;
/// tests run several side by side, each with its own transport.
pub struct NotificationService {
    transport: Arc<Transport>,
}

impl NotificationService {
    pub fn new() -> Self {
        Self {
            transport: Transport::new(),
        }
    }

    /// Start the producer side and get a send handle.
    pub fn init_send(
        &self,
        bus: Arc<dyn Bus>,
        store: Arc<dyn PropertyStore>,
    ) -> Result<NotificationSender, ServiceError> {
        self.transport.start_sender_transport(bus, false)?;
        Ok(NotificationSender::new(self.transport.clone(), store))
    }

    /// Start the producer side in SuperAgent relay mode: notifications go
    /// out on the SuperAgent interface instead of the plain one.
    pub fn init_send_super_agent(
        &self,
        bus: Arc<dyn Bus>,
        store: Arc<dyn PropertyStore>,
    ) -> Result<NotificationSender, ServiceError> {
        self.transport.start_sender_transport(bus, true)?;
        Ok(NotificationSender::new(self.transport.clone(), store))
    }

    /// Start the consumer side with `receiver` as the application
    /// callback.
    pub fn init_receive(
        &self,
        bus: Arc<dyn Bus>,
        receiver: Arc<dyn NotificationReceiver>,
    ) -> Result<(), ServiceError> {
        self.transport.start_receiver_transport(bus, receiver)
    }

    /// Opt out of SuperAgent arbitration; must be called before
    /// `init_receive`.
    pub fn disable_super_agent(&self) -> Result<(), ServiceError> {
        self.transport.disable_super_agent()
    }

    pub fn disable_sending(&self) {
        self.transport.disable_sending();
    }

    pub fn enable_sending(&self) {
        self.transport.enable_sending();
    }

    pub fn disable_receiving(&self) {
        self.transport.disable_receiving();
    }

    pub fn enable_receiving(&self) {
        self.transport.enable_receiving();
    }

    /// The transport facade, exposed for introspection.
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn shutdown_sender(&self) {
        self.transport.cleanup_sender();
        info!("sender transport stopped");
    }

    pub fn shutdown_receiver(&self) {
        self.transport.cleanup_receiver();
        info!("receiver transport stopped");
    }

    /// Tear everything down, including the dismiss worker and the bus
    /// attachment reference.
    pub fn shutdown(&self) {
        self.transport.cleanup();
        info!("notification service stopped");
    }

    /// Wire protocol version this implementation speaks.
    pub fn version(&self) -> u16 {
        consts::NOTIFICATION_SERVICE_VERSION
    }
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NotificationService {
    fn drop(&mut self) {
        self.transport.cleanup();
    }
}
