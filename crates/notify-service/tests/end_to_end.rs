//! End-to-end scenarios over the loopback bus: producer to consumer
//! delivery, pending-message cancellation, the dismiss round trip, and
//! SuperAgent election plus failover.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use notify_bus::memory::{MemoryBus, MemoryNetwork};
use notify_bus::{
    AnnounceListener, Bus, BusError, BusListener, HandlerId, MatchRule, MethodHandler,
    SerialNumber, SessionId, SessionPort, SignalHandler, SignalSpec,
};
use notify_service::{
    CoordinatorState, MessageType, Notification, NotificationReceiver, NotificationText,
    NotificationService, ReceivedNotification, ServiceError, StaticPropertyStore,
};
use notify_wire::{Arg, consts};

const APP_ID: [u8; 16] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE,
    0xFF,
];
const APP_ID_HEX: &str = "00112233445566778899AABBCCDDEEFF";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

fn store() -> Arc<StaticPropertyStore> {
    Arc::new(StaticPropertyStore::new(
        "device-1",
        "Device One",
        APP_ID,
        "end-to-end",
    ))
}

fn wait_until(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    predicate()
}

/// Records everything the service delivers to it.
#[derive(Default)]
struct Collector {
    received: Mutex<Vec<ReceivedNotification>>,
    dismissed: Mutex<Vec<(i32, String)>>,
}

impl Collector {
    fn received_count(&self) -> usize {
        self.received.lock().len()
    }

    fn dismissed_count(&self) -> usize {
        self.dismissed.lock().len()
    }
}

impl NotificationReceiver for Collector {
    fn receive(&self, notification: ReceivedNotification) {
        self.received.lock().push(notification);
    }

    fn dismiss(&self, message_id: i32, app_id: &str) {
        self.dismissed.lock().push((message_id, app_id.to_owned()));
    }
}

fn info_notification(text: &str) -> Notification {
    Notification::new(
        MessageType::Info,
        vec![NotificationText::new("en", text)],
    )
}

/// Message ids of the pending notify signals still held by the network.
fn pending_notify_ids(net: &MemoryNetwork) -> Vec<i32> {
    net.sessionless_snapshot()
        .into_iter()
        .filter(|record| record.member == consts::NOTIFY_SIGNAL_NAME)
        .map(|record| record.args[1].as_i32("messageId").unwrap())
        .collect()
}

#[test]
fn notification_reaches_consumer() {
    init_tracing();
    let net = MemoryNetwork::new();
    let producer_bus: Arc<dyn Bus> = net.connect();
    let consumer_bus: Arc<dyn Bus> = net.connect();
    let producer_name = producer_bus.unique_name();

    let producer = NotificationService::new();
    let sender = producer.init_send(producer_bus, store()).unwrap();

    let consumer = NotificationService::new();
    let collector = Arc::new(Collector::default());
    consumer
        .init_receive(consumer_bus, collector.clone())
        .unwrap();

    let id = sender.send(&info_notification("hello"), 30).unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        collector.received_count() == 1
    }));
    let received = collector.received.lock();
    let notification = received[0].notification();
    assert_eq!(notification.message_type, MessageType::Info);
    assert_eq!(notification.message_id, id);
    assert_eq!(notification.version, consts::NOTIFICATION_SERVICE_VERSION);
    assert_eq!(notification.text.len(), 1);
    assert_eq!(notification.text[0].language, "en");
    assert_eq!(notification.text[0].text, "hello");
    assert_eq!(notification.app_id.as_deref(), Some(APP_ID_HEX));
    assert_eq!(notification.app_name.as_deref(), Some("end-to-end"));
    assert_eq!(notification.sender.as_deref(), Some(producer_name.as_str()));
    assert_eq!(
        notification.original_sender.as_deref(),
        Some(producer_name.as_str())
    );
}

#[test]
fn delete_last_cancels_only_the_newest() {
    init_tracing();
    let net = MemoryNetwork::new();
    let bus: Arc<dyn Bus> = net.connect();

    let producer = NotificationService::new();
    let sender = producer.init_send(bus, store()).unwrap();

    let first = sender.send(&info_notification("first"), 40).unwrap();
    let second = sender.send(&info_notification("second"), 40).unwrap();
    let mut pending = pending_notify_ids(&net);
    pending.sort_unstable();
    let mut expected = vec![first, second];
    expected.sort_unstable();
    assert_eq!(pending, expected);

    sender.delete_last_msg(MessageType::Info).unwrap();
    assert_eq!(pending_notify_ids(&net), vec![first]);

    // The slot forgot the cancelled message; there is nothing left to
    // delete for this type.
    assert!(matches!(
        sender.delete_last_msg(MessageType::Info),
        Err(ServiceError::NothingToDelete)
    ));
}

#[test]
fn delete_last_fails_before_any_send() {
    init_tracing();
    let net = MemoryNetwork::new();
    let bus: Arc<dyn Bus> = net.connect();
    let producer = NotificationService::new();
    let sender = producer.init_send(bus, store()).unwrap();

    assert!(matches!(
        sender.delete_last_msg(MessageType::Warning),
        Err(ServiceError::NothingToDelete)
    ));
}

#[test]
fn sender_init_is_idempotent() {
    init_tracing();
    let net = MemoryNetwork::new();
    let bus: Arc<dyn Bus> = net.connect();
    let producer = NotificationService::new();

    let first = producer.init_send(bus.clone(), store()).unwrap();
    let second = producer.init_send(bus, store()).unwrap();

    first.send(&info_notification("one"), 30).unwrap();
    second.send(&info_notification("two"), 30).unwrap();
    assert_eq!(pending_notify_ids(&net).len(), 2);
}

#[test]
fn ttl_out_of_bounds_is_rejected() {
    init_tracing();
    let net = MemoryNetwork::new();
    let bus: Arc<dyn Bus> = net.connect();
    let producer = NotificationService::new();
    let sender = producer.init_send(bus, store()).unwrap();

    assert!(sender.send(&info_notification("x"), 29).is_err());
    assert!(sender.send(&info_notification("x"), 43201).is_err());
    assert!(pending_notify_ids(&net).is_empty());
}

#[test]
fn dismiss_round_trip_cancels_and_notifies_everyone() {
    init_tracing();
    let net = MemoryNetwork::new();
    let producer_bus: Arc<dyn Bus> = net.connect();
    let consumer_bus: Arc<dyn Bus> = net.connect();
    let observer_bus: Arc<dyn Bus> = net.connect();

    let producer = NotificationService::new();
    let sender = producer.init_send(producer_bus, store()).unwrap();

    let consumer = NotificationService::new();
    let collector = Arc::new(Collector::default());
    consumer
        .init_receive(consumer_bus, collector.clone())
        .unwrap();

    let observer = NotificationService::new();
    let observer_collector = Arc::new(Collector::default());
    observer
        .init_receive(observer_bus, observer_collector.clone())
        .unwrap();

    let id = sender.send(&info_notification("dismiss me"), 120).unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        collector.received_count() == 1 && observer_collector.received_count() == 1
    }));

    let received = collector.received.lock().remove(0);
    let started = Instant::now();
    received.dismiss();
    // Only an enqueue; the session join and method call happen later on
    // the worker.
    assert!(started.elapsed() < Duration::from_millis(50));

    // Every consumer still showing the message hears about the dismissal.
    assert!(wait_until(Duration::from_secs(5), || {
        observer_collector
            .dismissed
            .lock()
            .iter()
            .any(|(msg, app)| *msg == id && app == APP_ID_HEX)
    }));
    // The producer cancelled the pending signal when its Dismiss method
    // was invoked.
    assert!(wait_until(Duration::from_secs(5), || {
        !pending_notify_ids(&net).contains(&id)
    }));
}

#[test]
fn dismisses_make_progress_when_sessions_cannot_be_joined() {
    init_tracing();
    let net = MemoryNetwork::new();
    let producer_bus: Arc<dyn Bus> = net.connect();
    let consumer_bus: Arc<dyn Bus> = net.connect();
    let observer_bus: Arc<dyn Bus> = net.connect();
    let producer_name = producer_bus.unique_name();

    let producer = NotificationService::new();
    let sender = producer.init_send(producer_bus, store()).unwrap();

    let consumer = NotificationService::new();
    let collector = Arc::new(Collector::default());
    consumer
        .init_receive(consumer_bus, collector.clone())
        .unwrap();

    let observer = NotificationService::new();
    let observer_collector = Arc::new(Collector::default());
    observer
        .init_receive(observer_bus, observer_collector.clone())
        .unwrap();

    sender.send(&info_notification("orphaned"), 60).unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        collector.received_count() == 1
    }));

    // The producer goes away; every session join from now on fails.
    net.drop_peer(&producer_name);

    let received = Arc::new(collector.received.lock().remove(0));
    let threads: Vec<_> = (0..8)
        .map(|_| {
            let received = received.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    received.dismiss();
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    // All 80 dismissals are still broadcast, join failures notwithstanding.
    assert!(wait_until(Duration::from_secs(10), || {
        observer_collector.dismissed_count() >= 80
    }));
}

#[test]
fn superagent_election_and_failover() {
    init_tracing();
    let net = MemoryNetwork::new();
    let producer_bus: Arc<dyn Bus> = net.connect();
    let consumer_bus: Arc<dyn Bus> = net.connect();
    let agent_bus: Arc<dyn Bus> = net.connect();
    let agent_name = agent_bus.unique_name();

    let producer = NotificationService::new();
    let sender = producer.init_send(producer_bus, store()).unwrap();

    let agent = NotificationService::new();
    let agent_sender = agent
        .init_send_super_agent(agent_bus.clone(), store())
        .unwrap();
    agent_bus.advertise_name(&agent_name).unwrap();

    let consumer = NotificationService::new();
    let collector = Arc::new(Collector::default());
    consumer
        .init_receive(consumer_bus, collector.clone())
        .unwrap();
    assert_eq!(
        consumer.transport().coordinator_state(),
        CoordinatorState::DiscoveringFirst
    );

    // First aggregated signal elects the agent.
    agent_sender
        .send(&info_notification("from the agent"), 30)
        .unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        consumer.transport().coordinator_state() == CoordinatorState::ListeningToSuperAgent
    }));
    assert_eq!(
        consumer.transport().super_agent_name().as_deref(),
        Some(agent_name.as_str())
    );
    assert!(wait_until(Duration::from_secs(5), || {
        collector.received_count() == 1
    }));

    // Direct producer traffic is no longer subscribed to.
    sender.send(&info_notification("direct, ignored"), 30).unwrap();
    agent_sender
        .send(&info_notification("aggregated"), 30)
        .unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        collector.received_count() == 2
    }));
    net.flush();
    assert_eq!(collector.received_count(), 2);
    assert_eq!(
        collector.received.lock()[1].notification().text[0].text,
        "aggregated"
    );

    // Agent disappears; the consumer falls back to direct delivery.
    net.drop_peer(&agent_name);
    assert!(wait_until(Duration::from_secs(5), || {
        consumer.transport().coordinator_state() == CoordinatorState::DiscoveringFirst
    }));
    assert_eq!(consumer.transport().super_agent_name(), None);

    sender.send(&info_notification("direct again"), 30).unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        collector.received_count() == 3
    }));
    assert_eq!(
        collector.received.lock()[2].notification().text[0].text,
        "direct again"
    );
}

#[test]
fn superagent_announcement_triggers_election() {
    init_tracing();
    let net = MemoryNetwork::new();
    let consumer_bus: Arc<dyn Bus> = net.connect();
    let agent_bus: Arc<dyn Bus> = net.connect();
    let agent_name = agent_bus.unique_name();

    let consumer = NotificationService::new();
    let collector = Arc::new(Collector::default());
    consumer
        .init_receive(consumer_bus, collector.clone())
        .unwrap();

    let agent = NotificationService::new();
    let agent_sender = agent
        .init_send_super_agent(agent_bus.clone(), store())
        .unwrap();
    agent_bus.advertise_name(&agent_name).unwrap();
    agent_bus
        .announce(&[(
            "/superAgent".to_owned(),
            vec![consts::SUPERAGENT_INTERFACE_NAME.to_owned()],
        )])
        .unwrap();

    // No signal needed: the announcement alone elects the agent.
    assert!(wait_until(Duration::from_secs(5), || {
        consumer.transport().coordinator_state() == CoordinatorState::ListeningToSuperAgent
    }));

    agent_sender
        .send(&info_notification("announced and elected"), 30)
        .unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        collector.received_count() == 1
    }));
}

#[test]
fn disable_super_agent_rejected_after_receiver_start() {
    init_tracing();
    let net = MemoryNetwork::new();
    let bus: Arc<dyn Bus> = net.connect();
    let consumer = NotificationService::new();
    consumer
        .init_receive(bus, Arc::new(Collector::default()))
        .unwrap();

    assert!(matches!(
        consumer.disable_super_agent(),
        Err(ServiceError::ReceiverAlreadyStarted)
    ));
}

#[test]
fn disabled_sending_is_an_error_and_reenabling_recovers() {
    init_tracing();
    let net = MemoryNetwork::new();
    let bus: Arc<dyn Bus> = net.connect();
    let producer = NotificationService::new();
    let sender = producer.init_send(bus, store()).unwrap();

    producer.disable_sending();
    assert!(matches!(
        sender.send(&info_notification("blocked"), 30),
        Err(ServiceError::SendingDisabled)
    ));
    producer.enable_sending();
    sender.send(&info_notification("through"), 30).unwrap();
    assert_eq!(pending_notify_ids(&net).len(), 1);
}

/// Delegates to a loopback attachment but refuses match rules for one
/// interface, standing in for a bus that fails partway through a start
/// sequence.
struct RefusingMatchBus {
    inner: Arc<MemoryBus>,
    refused_interface: &'static str,
}

impl Bus for RefusingMatchBus {
    fn unique_name(&self) -> String {
        self.inner.unique_name()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn send_signal(
        &self,
        spec: &SignalSpec,
        args: &[Arg],
        ttl: u16,
        sessionless: bool,
    ) -> Result<SerialNumber, BusError> {
        self.inner.send_signal(spec, args, ttl, sessionless)
    }

    fn cancel_sessionless(&self, serial: SerialNumber) -> Result<(), BusError> {
        self.inner.cancel_sessionless(serial)
    }

    fn register_signal_handler(
        &self,
        interface: &str,
        member: &str,
        handler: SignalHandler,
    ) -> Result<HandlerId, BusError> {
        self.inner.register_signal_handler(interface, member, handler)
    }

    fn unregister_signal_handler(&self, id: HandlerId) -> Result<(), BusError> {
        self.inner.unregister_signal_handler(id)
    }

    fn add_method_handler(
        &self,
        path: &str,
        interface: &str,
        member: &str,
        handler: MethodHandler,
    ) -> Result<HandlerId, BusError> {
        self.inner.add_method_handler(path, interface, member, handler)
    }

    fn remove_method_handler(&self, id: HandlerId) -> Result<(), BusError> {
        self.inner.remove_method_handler(id)
    }

    fn method_call(
        &self,
        peer: &str,
        session: SessionId,
        interface: &str,
        member: &str,
        args: &[Arg],
    ) -> Result<Vec<Arg>, BusError> {
        self.inner.method_call(peer, session, interface, member, args)
    }

    fn join_session(&self, peer: &str, port: SessionPort) -> Result<SessionId, BusError> {
        self.inner.join_session(peer, port)
    }

    fn leave_session(&self, session: SessionId) -> Result<(), BusError> {
        self.inner.leave_session(session)
    }

    fn bind_session_port(&self, port: SessionPort) -> Result<(), BusError> {
        self.inner.bind_session_port(port)
    }

    fn add_match(&self, rule: &MatchRule) -> Result<(), BusError> {
        if rule.interface == self.refused_interface {
            return Err(BusError::invalid_args(format!("match refused: {rule}")));
        }
        self.inner.add_match(rule)
    }

    fn remove_match(&self, rule: &MatchRule) -> Result<(), BusError> {
        self.inner.remove_match(rule)
    }

    fn advertise_name(&self, name: &str) -> Result<(), BusError> {
        self.inner.advertise_name(name)
    }

    fn cancel_advertise_name(&self, name: &str) -> Result<(), BusError> {
        self.inner.cancel_advertise_name(name)
    }

    fn find_advertised_name(&self, name: &str) -> Result<(), BusError> {
        self.inner.find_advertised_name(name)
    }

    fn cancel_find_advertised_name(&self, name: &str) -> Result<(), BusError> {
        self.inner.cancel_find_advertised_name(name)
    }

    fn register_bus_listener(&self, listener: Arc<dyn BusListener>) -> HandlerId {
        self.inner.register_bus_listener(listener)
    }

    fn unregister_bus_listener(&self, id: HandlerId) {
        self.inner.unregister_bus_listener(id)
    }

    fn register_announce_listener(&self, listener: Arc<dyn AnnounceListener>) -> HandlerId {
        self.inner.register_announce_listener(listener)
    }

    fn unregister_announce_listener(&self, id: HandlerId) {
        self.inner.unregister_announce_listener(id)
    }

    fn who_implements(&self, interface: &str) -> Result<(), BusError> {
        self.inner.who_implements(interface)
    }

    fn announce(&self, object_description: &[(String, Vec<String>)]) -> Result<(), BusError> {
        self.inner.announce(object_description)
    }
}

#[test]
fn failed_receiver_start_leaves_nothing_listening() {
    init_tracing();
    let net = MemoryNetwork::new();
    let producer_bus: Arc<dyn Bus> = net.connect();
    // The consumer and Notification match come up first, then the
    // Dismisser match fails mid-sequence.
    let consumer_bus: Arc<dyn Bus> = Arc::new(RefusingMatchBus {
        inner: net.connect(),
        refused_interface: consts::DISMISSER_INTERFACE_NAME,
    });

    let consumer = NotificationService::new();
    let collector = Arc::new(Collector::default());
    assert!(
        consumer
            .init_receive(consumer_bus, collector.clone())
            .is_err()
    );
    assert_eq!(
        consumer.transport().coordinator_state(),
        CoordinatorState::NoSuperAgent
    );

    // Nothing the failed start created may keep receiving.
    let producer = NotificationService::new();
    let sender = producer.init_send(producer_bus, store()).unwrap();
    sender.send(&info_notification("unheard"), 30).unwrap();
    net.flush();
    assert_eq!(collector.received_count(), 0);
}
