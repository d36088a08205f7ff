//! Transport facade tying the sub-objects together.
//!
//! One [`Transport`] owns everything a process needs to produce and
//! consume notifications over a single bus attachment: the per-type
//! producer slots, the producer-facing Dismiss endpoint, the consumer and
//! dismisser receivers, the SuperAgent coordinator, and the shared dismiss
//! worker queue. It is a plain caller-owned value; independent transports
//! (on independent attachments) can coexist in one process.
//!
//! Lock order is transport state first, bus second. Bus callbacks run on
//! the dispatch thread and take transport locks, so nothing here may call
//! into the bus while the bus holds its own registry locks; the loopback
//! bus upholds that on its side. Sub-objects that own worker threads are
//! always taken out of the state under the lock and stopped after it is
//! released, because their workers take the same locks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use notify_bus::{Bus, HandlerId, MatchRule};
use notify_wire::{Arg, MessageType, Notification, consts};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::consumer::ConsumerTransport;
use crate::dismiss::{DismissTask, process_dismiss};
use crate::dismisser::{DismisserReceiver, send_transient_dismiss};
use crate::error::ServiceError;
use crate::producer::ProducerTransport;
use crate::producer_receiver::ProducerReceiver;
use crate::receiver::{NotificationReceiver, ReceivedNotification};
use crate::superagent::{SuperAgentAnnounceListener, SuperAgentBusListener, SuperAgentTransport};
use crate::task_queue::{QueueHandle, TaskQueue};

/// Where the receive side currently gets its notifications from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// SuperAgent handling is disabled or the receiver is not started.
    NoSuperAgent,
    /// Direct delivery; waiting for a first SuperAgent signal or
    /// announcement to start discovery.
    DiscoveringFirst,
    /// Direct delivery; advertised-name discovery of a candidate agent is
    /// in flight.
    ListeningDirect,
    /// All traffic comes from one elected SuperAgent.
    ListeningToSuperAgent,
}

struct SenderState {
    producers: Option<[ProducerTransport; notify_wire::MESSAGE_TYPE_CNT]>,
    producer_receiver: Option<ProducerReceiver>,
    /// Raw app id of the identity this producer last sent with; used when
    /// re-broadcasting a dismiss received over the Dismiss method.
    app_id: Option<Vec<u8>>,
}

struct ReceiverState {
    consumer: Option<ConsumerTransport>,
    dismisser_receiver: Option<DismisserReceiver>,
    super_agent: Option<SuperAgentTransport>,
    sa_listener: Option<(HandlerId, Arc<SuperAgentBusListener>)>,
    announce_listener: Option<HandlerId>,
    notification_match: bool,
    dismisser_match: bool,
    sa_match: bool,
    /// Bus name of the elected SuperAgent, when listening to one.
    listening_to: Option<String>,
    state: CoordinatorState,
}

pub struct Transport {
    bus: Mutex<Option<Arc<dyn Bus>>>,
    dismiss_queue: Mutex<Option<TaskQueue<DismissTask>>>,
    dismiss_handle: QueueHandle<DismissTask>,
    sender_state: Mutex<SenderState>,
    receiver_state: Mutex<ReceiverState>,
    receiver_callback: Mutex<Option<Arc<dyn NotificationReceiver>>>,
    superagent_disabled: AtomicBool,
    sending_disabled: AtomicBool,
    receiving_disabled: AtomicBool,
}

impl Transport {
    /// Create the transport and its dismiss worker. The worker holds a
    /// weak reference back to the transport, so dropping the last `Arc`
    /// still lets the worker wind down.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Transport>| {
            let worker = weak.clone();
            let queue = TaskQueue::start("notif-dismiss", move |task: DismissTask| {
                let Some(transport) = worker.upgrade() else {
                    return;
                };
                let Some(bus) = transport.current_bus() else {
                    warn!(message_id = task.message_id, "no bus attachment, dismiss dropped");
                    return;
                };
                process_dismiss(&bus, &task);
            });
            let dismiss_handle = queue.handle();
            Transport {
                bus: Mutex::new(None),
                dismiss_queue: Mutex::new(Some(queue)),
                dismiss_handle,
                sender_state: Mutex::new(SenderState {
                    producers: None,
                    producer_receiver: None,
                    app_id: None,
                }),
                receiver_state: Mutex::new(ReceiverState {
                    consumer: None,
                    dismisser_receiver: None,
                    super_agent: None,
                    sa_listener: None,
                    announce_listener: None,
                    notification_match: false,
                    dismisser_match: false,
                    sa_match: false,
                    listening_to: None,
                    state: CoordinatorState::NoSuperAgent,
                }),
                receiver_callback: Mutex::new(None),
                superagent_disabled: AtomicBool::new(false),
                sending_disabled: AtomicBool::new(false),
                receiving_disabled: AtomicBool::new(false),
            }
        })
    }

    pub fn current_bus(&self) -> Option<Arc<dyn Bus>> {
        self.bus.lock().clone()
    }

    /// Attach the bus. A second attachment is only accepted if it is the
    /// same one.
    pub fn set_bus(&self, bus: &Arc<dyn Bus>) -> Result<(), ServiceError> {
        if !bus.is_connected() {
            return Err(ServiceError::NotConnected);
        }
        let mut slot = self.bus.lock();
        match &*slot {
            Some(existing) if existing.unique_name() != bus.unique_name() => {
                Err(ServiceError::BusMismatch)
            }
            Some(_) => Ok(()),
            None => {
                *slot = Some(bus.clone());
                Ok(())
            }
        }
    }

    // ---- sender side ----

    /// Bring up the producer side: per-type signal slots, the Dismiss
    /// method endpoint, and the bound session port. Idempotent. On
    /// failure, only what this call created is torn down.
    pub fn start_sender_transport(
        self: &Arc<Self>,
        bus: Arc<dyn Bus>,
        super_agent_mode: bool,
    ) -> Result<(), ServiceError> {
        self.set_bus(&bus)?;
        if self.sender_state.lock().producers.is_some() {
            return Ok(());
        }

        let interface = if super_agent_mode {
            consts::SUPERAGENT_INTERFACE_NAME
        } else {
            consts::NOTIFICATION_INTERFACE_NAME
        };
        let producers = MessageType::ALL.map(|t| ProducerTransport::new(t, interface));
        let producer_receiver = ProducerReceiver::start(bus.clone(), Arc::downgrade(self))?;
        if let Err(error) = bus.bind_session_port(consts::PRODUCER_SERVICE_PORT) {
            producer_receiver.unregister();
            return Err(error.into());
        }

        let mut state = self.sender_state.lock();
        if state.producers.is_some() {
            // Lost a start race; keep the earlier instance.
            drop(state);
            producer_receiver.unregister();
            return Ok(());
        }
        state.producers = Some(producers);
        state.producer_receiver = Some(producer_receiver);
        info!(super_agent_mode, "sender transport started");
        Ok(())
    }

    /// Remember the app id the producer currently sends with.
    pub(crate) fn set_app_id(&self, app_id: Vec<u8>) {
        self.sender_state.lock().app_id = Some(app_id);
    }

    pub fn send_notification(
        &self,
        message_type: MessageType,
        args: &[Arg],
        ttl: u16,
    ) -> Result<(), ServiceError> {
        if self.sending_disabled.load(Ordering::SeqCst) {
            return Err(ServiceError::SendingDisabled);
        }
        let bus = self.current_bus().ok_or(ServiceError::SenderNotStarted)?;
        let mut state = self.sender_state.lock();
        let slots = state
            .producers
            .as_mut()
            .ok_or(ServiceError::SenderNotStarted)?;
        slots[message_type as usize].send_signal(&bus, args, ttl)
    }

    pub fn delete_last_msg(&self, message_type: MessageType) -> Result<(), ServiceError> {
        let bus = self.current_bus().ok_or(ServiceError::SenderNotStarted)?;
        let mut state = self.sender_state.lock();
        let slots = state
            .producers
            .as_mut()
            .ok_or(ServiceError::SenderNotStarted)?;
        slots[message_type as usize].delete_last_msg(&bus)
    }

    /// Cancel the pending notification carrying `message_id`, whichever
    /// type slot sent it.
    pub fn delete_msg(&self, message_id: i32) -> Result<(), ServiceError> {
        let bus = self.current_bus().ok_or(ServiceError::SenderNotStarted)?;
        let mut state = self.sender_state.lock();
        let slots = state
            .producers
            .as_mut()
            .ok_or(ServiceError::SenderNotStarted)?;
        for slot in slots.iter_mut() {
            match slot.delete_msg(&bus, message_id) {
                Ok(()) => return Ok(()),
                Err(ServiceError::NothingToDelete | ServiceError::NoSuchMessage { .. }) => continue,
                Err(error) => return Err(error),
            }
        }
        Err(ServiceError::NoSuchMessage { message_id })
    }

    /// A consumer invoked our Dismiss method. The reply already went out;
    /// cancel the pending signal and tell every other consumer.
    pub(crate) fn on_producer_dismiss(&self, message_id: i32) {
        let Some(bus) = self.current_bus() else {
            return;
        };
        if let Err(error) = self.delete_msg(message_id) {
            debug!(message_id, %error, "nothing cancelled for dismissed message");
        }
        let app_id = self.sender_state.lock().app_id.clone();
        match app_id {
            Some(app_id) => {
                if let Err(error) = send_transient_dismiss(&bus, message_id, &app_id) {
                    warn!(message_id, %error, "dismiss broadcast failed");
                }
            }
            None => warn!(message_id, "producer app id unknown, dismiss broadcast skipped"),
        }
    }

    // ---- receiver side ----

    /// Bring up the consumer side and register the application callback.
    /// Idempotent per sub-object.
    pub fn start_receiver_transport(
        self: &Arc<Self>,
        bus: Arc<dyn Bus>,
        receiver: Arc<dyn NotificationReceiver>,
    ) -> Result<(), ServiceError> {
        self.set_bus(&bus)?;
        *self.receiver_callback.lock() = Some(receiver);
        let result = {
            let mut state = self.receiver_state.lock();
            self.start_receiver_locked(&bus, &mut state)
        };
        if let Err(error) = &result {
            // A partial start must not keep receiving. Tear down everything
            // this call managed to create before reporting the failure.
            warn!(%error, "receiver start failed, unwinding");
            self.cleanup_receiver();
        }
        result
    }

    /// Create whichever receive-side pieces are missing. Also used to
    /// rebuild direct reception after a SuperAgent goes away.
    fn start_receiver_locked(
        self: &Arc<Self>,
        bus: &Arc<dyn Bus>,
        state: &mut ReceiverState,
    ) -> Result<(), ServiceError> {
        if state.consumer.is_none() {
            state.consumer = Some(ConsumerTransport::start(
                bus.clone(),
                consts::NOTIFICATION_INTERFACE_NAME,
                Arc::downgrade(self),
            )?);
        }
        if !state.notification_match {
            bus.add_match(&MatchRule::sessionless(consts::NOTIFICATION_INTERFACE_NAME))?;
            state.notification_match = true;
        }
        if state.dismisser_receiver.is_none() {
            state.dismisser_receiver =
                Some(DismisserReceiver::start(bus.clone(), Arc::downgrade(self))?);
        }
        if !state.dismisser_match {
            bus.add_match(&MatchRule::sessionless(consts::DISMISSER_INTERFACE_NAME))?;
            state.dismisser_match = true;
        }

        if self.superagent_disabled.load(Ordering::SeqCst) {
            state.state = CoordinatorState::NoSuperAgent;
            return Ok(());
        }

        if state.super_agent.is_none() {
            state.super_agent = Some(SuperAgentTransport::start(
                bus.clone(),
                Arc::downgrade(self),
            )?);
        }
        if !state.sa_match {
            bus.add_match(&MatchRule::sessionless(consts::SUPERAGENT_INTERFACE_NAME))?;
            state.sa_match = true;
        }
        if state.sa_listener.is_none() {
            let listener = Arc::new(SuperAgentBusListener::new(Arc::downgrade(self)));
            let id = bus.register_bus_listener(listener.clone());
            state.sa_listener = Some((id, listener));
        }
        if state.announce_listener.is_none() {
            let listener = Arc::new(SuperAgentAnnounceListener::new(Arc::downgrade(self)));
            let id = bus.register_announce_listener(listener);
            bus.who_implements(consts::SUPERAGENT_INTERFACE_NAME)?;
            state.announce_listener = Some(id);
        }
        state.state = CoordinatorState::DiscoveringFirst;
        Ok(())
    }

    /// Start advertised-name discovery of a SuperAgent candidate.
    pub(crate) fn find_super_agent(&self, name: &str) -> Result<(), ServiceError> {
        let bus = self.current_bus().ok_or(ServiceError::NotConnected)?;
        let mut state = self.receiver_state.lock();
        if state.state == CoordinatorState::ListeningToSuperAgent {
            return Ok(());
        }
        let Some((_, listener)) = &state.sa_listener else {
            return Ok(());
        };
        listener.set_expected(name);
        bus.find_advertised_name(name)?;
        state.state = CoordinatorState::ListeningDirect;
        debug!(%name, "superagent discovery started");
        Ok(())
    }

    /// The discovered agent was confirmed: collapse reception down to one
    /// match scoped to it.
    pub(crate) fn listen_to_super_agent(&self, name: &str) -> Result<(), ServiceError> {
        let bus = self.current_bus().ok_or(ServiceError::NotConnected)?;
        let mut state = self.receiver_state.lock();
        if state.state == CoordinatorState::ListeningToSuperAgent {
            return Ok(());
        }
        if let Some(sa) = &state.super_agent {
            sa.set_first(false);
        }
        if state.notification_match {
            bus.remove_match(&MatchRule::sessionless(consts::NOTIFICATION_INTERFACE_NAME))?;
            state.notification_match = false;
        }
        let consumer = state.consumer.take();
        if let Some(id) = state.announce_listener.take() {
            bus.unregister_announce_listener(id);
        }
        bus.add_match(&MatchRule::from_sender(
            consts::SUPERAGENT_INTERFACE_NAME,
            name,
        ))?;
        if state.sa_match {
            bus.remove_match(&MatchRule::sessionless(consts::SUPERAGENT_INTERFACE_NAME))?;
            state.sa_match = false;
        }
        state.listening_to = Some(name.to_owned());
        state.state = CoordinatorState::ListeningToSuperAgent;
        info!(%name, "listening to superagent");
        drop(state);
        // Joins the consumer worker, so never under the state lock.
        if let Some(consumer) = consumer {
            consumer.unregister();
        }
        Ok(())
    }

    /// The elected agent disappeared: restore direct reception and re-arm
    /// discovery.
    pub(crate) fn cancel_listen_to_super_agent(
        self: &Arc<Self>,
        name: &str,
    ) -> Result<(), ServiceError> {
        let bus = self.current_bus().ok_or(ServiceError::NotConnected)?;
        let mut state = self.receiver_state.lock();
        if state.listening_to.as_deref() != Some(name) {
            return Ok(());
        }
        state.listening_to = None;
        state.state = CoordinatorState::DiscoveringFirst;
        if let Err(error) = bus.remove_match(&MatchRule::from_sender(
            consts::SUPERAGENT_INTERFACE_NAME,
            name,
        )) {
            warn!(%name, %error, "failed to remove scoped superagent match");
        }
        self.start_receiver_locked(&bus, &mut state)?;
        if let Some(sa) = &state.super_agent {
            sa.set_first(true);
        }
        info!(%name, "superagent lost, back to direct delivery");
        Ok(())
    }

    pub(crate) fn on_received_notification(&self, notification: Notification) {
        if self.receiving_disabled.load(Ordering::SeqCst) {
            debug!("receiving disabled, notification dropped");
            return;
        }
        let Some(receiver) = self.receiver_callback.lock().clone() else {
            return;
        };
        receiver.receive(ReceivedNotification::new(
            notification,
            self.dismiss_handle.clone(),
        ));
    }

    pub(crate) fn on_dismiss(&self, message_id: i32, app_id: String) {
        if self.receiving_disabled.load(Ordering::SeqCst) {
            return;
        }
        let Some(receiver) = self.receiver_callback.lock().clone() else {
            return;
        };
        receiver.dismiss(message_id, &app_id);
    }

    // ---- toggles and introspection ----

    /// Opt out of SuperAgent arbitration. Only valid before the receiver
    /// transport is started.
    pub fn disable_super_agent(&self) -> Result<(), ServiceError> {
        let state = self.receiver_state.lock();
        if state.consumer.is_some() || state.super_agent.is_some() {
            return Err(ServiceError::ReceiverAlreadyStarted);
        }
        self.superagent_disabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn disable_sending(&self) {
        self.sending_disabled.store(true, Ordering::SeqCst);
    }

    pub fn enable_sending(&self) {
        self.sending_disabled.store(false, Ordering::SeqCst);
    }

    pub fn disable_receiving(&self) {
        self.receiving_disabled.store(true, Ordering::SeqCst);
    }

    pub fn enable_receiving(&self) {
        self.receiving_disabled.store(false, Ordering::SeqCst);
    }

    pub fn coordinator_state(&self) -> CoordinatorState {
        self.receiver_state.lock().state
    }

    /// Bus name of the elected SuperAgent, if listening to one.
    pub fn super_agent_name(&self) -> Option<String> {
        self.receiver_state.lock().listening_to.clone()
    }

    // ---- teardown ----

    pub fn cleanup_sender(&self) {
        let producer_receiver = {
            let mut state = self.sender_state.lock();
            state.producers = None;
            state.app_id = None;
            state.producer_receiver.take()
        };
        // Its worker takes the sender state lock, so stop it after the
        // lock is released.
        if let Some(producer_receiver) = producer_receiver {
            producer_receiver.unregister();
        }
    }

    pub fn cleanup_receiver(&self) {
        *self.receiver_callback.lock() = None;
        let bus = self.current_bus();
        let mut state = self.receiver_state.lock();
        let consumer = state.consumer.take();
        let dismisser_receiver = state.dismisser_receiver.take();
        let super_agent = state.super_agent.take();
        let sa_listener = state.sa_listener.take();
        let announce_listener = state.announce_listener.take();
        let notification_match = std::mem::take(&mut state.notification_match);
        let dismisser_match = std::mem::take(&mut state.dismisser_match);
        let sa_match = std::mem::take(&mut state.sa_match);
        let listening_to = state.listening_to.take();
        state.state = CoordinatorState::NoSuperAgent;
        drop(state);

        if let Some(bus) = bus {
            let mut rules = Vec::new();
            if notification_match {
                rules.push(MatchRule::sessionless(consts::NOTIFICATION_INTERFACE_NAME));
            }
            if dismisser_match {
                rules.push(MatchRule::sessionless(consts::DISMISSER_INTERFACE_NAME));
            }
            if sa_match {
                rules.push(MatchRule::sessionless(consts::SUPERAGENT_INTERFACE_NAME));
            }
            if let Some(name) = listening_to {
                rules.push(MatchRule::from_sender(consts::SUPERAGENT_INTERFACE_NAME, name));
            }
            for rule in rules {
                if let Err(error) = bus.remove_match(&rule) {
                    warn!(%rule, %error, "failed to remove match during cleanup");
                }
            }
            if let Some((id, _)) = sa_listener {
                bus.unregister_bus_listener(id);
            }
            if let Some(id) = announce_listener {
                bus.unregister_announce_listener(id);
            }
        }

        if let Some(consumer) = consumer {
            consumer.unregister();
        }
        if let Some(dismisser_receiver) = dismisser_receiver {
            dismisser_receiver.unregister();
        }
        if let Some(super_agent) = super_agent {
            super_agent.unregister();
        }
    }

    /// Full teardown: dismiss worker first, then both transport sides,
    /// then the bus attachment.
    pub fn cleanup(&self) {
        let queue = self.dismiss_queue.lock().take();
        if let Some(mut queue) = queue {
            queue.stop();
        }
        self.cleanup_sender();
        self.cleanup_receiver();
        *self.bus.lock() = None;
    }
}
