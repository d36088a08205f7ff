//! In-process loopback bus.
//!
//! `MemoryNetwork` connects any number of [`MemoryBus`] attachments and
//! delivers signals, announcements, and found/lost-advertised-name events
//! from a single dispatch thread, in send order — the same threading
//! contract the real bus gives us. Method calls execute the target's
//! handler synchronously on the caller's thread, which also mirrors the
//! real bus: a method call blocks its caller, never the dispatch thread.
//!
//! Sessionless signals are retained (keyed by serial) until cancelled, and
//! the retained set is observable through [`MemoryNetwork::sessionless_snapshot`]
//! so tests can assert on cancellation behavior.
//!
//! Callbacks are always invoked with no registry lock held, so a handler
//! may freely call back into the bus.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use notify_wire::Arg;

use crate::{
    AnnounceListener, Bus, BusError, BusListener, HandlerId, MatchRule, Message, MethodHandler,
    SerialNumber, SessionId, SessionPort, SignalHandler, SignalSpec,
};

/// A sessionless signal still eligible for delivery.
#[derive(Debug, Clone)]
pub struct SessionlessRecord {
    pub serial: SerialNumber,
    pub sender: String,
    pub interface: String,
    pub member: String,
    pub args: Vec<Arg>,
    pub ttl: u16,
}

struct StoredSignal {
    sender: String,
    spec: SignalSpec,
    args: Vec<Arg>,
    ttl: u16,
}

#[derive(Default)]
struct Attachment {
    connected: bool,
    signal_handlers: Vec<(HandlerId, String, String, SignalHandler)>,
    method_handlers: Vec<(HandlerId, String, String, String, MethodHandler)>,
    matches: Vec<MatchRule>,
    bound_ports: HashSet<SessionPort>,
    bus_listeners: Vec<(HandlerId, Arc<dyn BusListener>)>,
    announce_listeners: Vec<(HandlerId, Arc<dyn AnnounceListener>)>,
    who_implements: HashSet<String>,
    finding: HashSet<String>,
}

struct SessionRecord {
    joiner: String,
    host: String,
}

#[derive(Default)]
struct NetState {
    next_name: u64,
    next_serial: SerialNumber,
    next_session: u64,
    next_handler: u64,
    attachments: HashMap<String, Attachment>,
    sessionless: BTreeMap<SerialNumber, StoredSignal>,
    sessions: HashMap<u64, SessionRecord>,
    advertised: HashMap<String, String>,
}

impl NetState {
    fn handler_id(&mut self) -> HandlerId {
        self.next_handler += 1;
        HandlerId(self.next_handler)
    }

    fn attachment(&mut self, name: &str) -> Result<&mut Attachment, BusError> {
        self.attachments
            .get_mut(name)
            .filter(|a| a.connected)
            .ok_or(BusError::Disconnected)
    }

    /// Compute the delivery list for one signal: every connected
    /// attachment with a matching rule gets each handler registered for
    /// the signal's interface/member. The emitter hears its own broadcast
    /// if it matches, same as on the real bus.
    fn deliveries(
        &self,
        sender: &str,
        serial: SerialNumber,
        spec: &SignalSpec,
        args: &[Arg],
    ) -> Vec<(SignalHandler, Message)> {
        let mut out = Vec::new();
        for attachment in self.attachments.values() {
            if !attachment.connected {
                continue;
            }
            if !attachment
                .matches
                .iter()
                .any(|rule| rule.matches(&spec.interface, sender))
            {
                continue;
            }
            for (_, interface, member, handler) in &attachment.signal_handlers {
                if interface == &spec.interface && member == &spec.member {
                    out.push((
                        handler.clone(),
                        Message {
                            sender: sender.to_owned(),
                            serial,
                            path: spec.path.clone(),
                            args: args.to_vec(),
                        },
                    ));
                }
            }
        }
        out
    }
}

struct FlushGate {
    done: Mutex<bool>,
    cv: Condvar,
}

enum Event {
    Signals(Vec<(SignalHandler, Message)>),
    Found(Vec<(Arc<dyn BusListener>, String)>),
    Lost(Vec<(Arc<dyn BusListener>, String)>),
    Announce(Vec<(Arc<dyn AnnounceListener>, String, Vec<(String, Vec<String>)>)>),
    Barrier(Arc<FlushGate>),
    Shutdown,
}

struct NetworkInner {
    state: Mutex<NetState>,
    tx: mpsc::Sender<Event>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkInner {
    fn emit(&self, event: Event) {
        // The dispatcher only exits on Shutdown, so a send failure means
        // the network is tearing down; events are dropped then.
        let _ = self.tx.send(event);
    }
}

impl Drop for NetworkInner {
    fn drop(&mut self) {
        let _ = self.tx.send(Event::Shutdown);
        if let Some(handle) = self.dispatcher.get_mut().take() {
            let _ = handle.join();
        }
    }
}

/// The shared registry connecting every [`MemoryBus`] attachment.
#[derive(Clone)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<Event>();
        let dispatcher = thread::Builder::new()
            .name("bus-dispatch".to_owned())
            .spawn(move || dispatch_loop(rx))
            .expect("failed to spawn bus dispatch thread");

        Self {
            inner: Arc::new(NetworkInner {
                state: Mutex::new(NetState::default()),
                tx,
                dispatcher: Mutex::new(Some(dispatcher)),
            }),
        }
    }

    /// Attach a new peer and hand out its bus endpoint.
    pub fn connect(&self) -> Arc<MemoryBus> {
        let mut state = self.inner.state.lock();
        state.next_name += 1;
        let name = format!(":1.{}", state.next_name);
        state.attachments.insert(
            name.clone(),
            Attachment {
                connected: true,
                ..Attachment::default()
            },
        );
        debug!(%name, "attachment connected");
        Arc::new(MemoryBus {
            inner: self.inner.clone(),
            name,
        })
    }

    /// Simulate a peer vanishing: disconnects it, drops its advertised
    /// names (firing lost-advertised-name at every discoverer), its
    /// pending sessionless signals, and its sessions.
    pub fn drop_peer(&self, name: &str) {
        let mut lost = Vec::new();
        {
            let mut state = self.inner.state.lock();
            if let Some(attachment) = state.attachments.get_mut(name) {
                attachment.connected = false;
            }
            state.sessionless.retain(|_, signal| signal.sender != name);
            state
                .sessions
                .retain(|_, s| s.joiner != name && s.host != name);

            let dropped_names: Vec<String> = state
                .advertised
                .iter()
                .filter(|(_, owner)| owner.as_str() == name)
                .map(|(advertised, _)| advertised.clone())
                .collect();
            for advertised in &dropped_names {
                state.advertised.remove(advertised);
            }

            for attachment in state.attachments.values() {
                if !attachment.connected {
                    continue;
                }
                for advertised in &dropped_names {
                    if attachment.finding.contains(advertised) {
                        for (_, listener) in &attachment.bus_listeners {
                            lost.push((listener.clone(), advertised.clone()));
                        }
                    }
                }
            }
        }
        if !lost.is_empty() {
            self.inner.emit(Event::Lost(lost));
        }
    }

    /// Snapshot of the sessionless signals still eligible for delivery.
    pub fn sessionless_snapshot(&self) -> Vec<SessionlessRecord> {
        let state = self.inner.state.lock();
        state
            .sessionless
            .iter()
            .map(|(serial, signal)| SessionlessRecord {
                serial: *serial,
                sender: signal.sender.clone(),
                interface: signal.spec.interface.clone(),
                member: signal.spec.member.clone(),
                args: signal.args.clone(),
                ttl: signal.ttl,
            })
            .collect()
    }

    /// Block until every event queued so far has been dispatched.
    pub fn flush(&self) {
        let gate = Arc::new(FlushGate {
            done: Mutex::new(false),
            cv: Condvar::new(),
        });
        self.inner.emit(Event::Barrier(gate.clone()));
        let mut done = gate.done.lock();
        while !*done {
            gate.cv.wait(&mut done);
        }
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

fn dispatch_loop(rx: mpsc::Receiver<Event>) {
    while let Ok(event) = rx.recv() {
        match event {
            Event::Signals(deliveries) => {
                for (handler, message) in deliveries {
                    handler(&message);
                }
            }
            Event::Found(listeners) => {
                for (listener, name) in listeners {
                    listener.found_advertised_name(&name);
                }
            }
            Event::Lost(listeners) => {
                for (listener, name) in listeners {
                    listener.lost_advertised_name(&name);
                }
            }
            Event::Announce(listeners) => {
                for (listener, bus_name, description) in listeners {
                    listener.announced(&bus_name, &description);
                }
            }
            Event::Barrier(gate) => {
                *gate.done.lock() = true;
                gate.cv.notify_all();
            }
            Event::Shutdown => break,
        }
    }
}

/// One peer's endpoint on a [`MemoryNetwork`].
pub struct MemoryBus {
    inner: Arc<NetworkInner>,
    name: String,
}

impl Bus for MemoryBus {
    fn unique_name(&self) -> String {
        self.name.clone()
    }

    fn is_connected(&self) -> bool {
        let state = self.inner.state.lock();
        state
            .attachments
            .get(&self.name)
            .is_some_and(|a| a.connected)
    }

    fn send_signal(
        &self,
        spec: &SignalSpec,
        args: &[Arg],
        ttl: u16,
        sessionless: bool,
    ) -> Result<SerialNumber, BusError> {
        let deliveries;
        let serial;
        {
            let mut state = self.inner.state.lock();
            state.attachment(&self.name)?;
            state.next_serial += 1;
            serial = state.next_serial;
            if sessionless {
                state.sessionless.insert(
                    serial,
                    StoredSignal {
                        sender: self.name.clone(),
                        spec: spec.clone(),
                        args: args.to_vec(),
                        ttl,
                    },
                );
            }
            deliveries = state.deliveries(&self.name, serial, spec, args);
        }
        debug!(
            sender = %self.name,
            serial,
            interface = %spec.interface,
            member = %spec.member,
            recipients = deliveries.len(),
            "signal sent"
        );
        if !deliveries.is_empty() {
            self.inner.emit(Event::Signals(deliveries));
        }
        Ok(serial)
    }

    fn cancel_sessionless(&self, serial: SerialNumber) -> Result<(), BusError> {
        let mut state = self.inner.state.lock();
        match state.sessionless.get(&serial) {
            Some(signal) if signal.sender == self.name => {
                state.sessionless.remove(&serial);
                Ok(())
            }
            _ => Err(BusError::NoSuchSerial { serial }),
        }
    }

    fn register_signal_handler(
        &self,
        interface: &str,
        member: &str,
        handler: SignalHandler,
    ) -> Result<HandlerId, BusError> {
        let mut state = self.inner.state.lock();
        let id = state.handler_id();
        let attachment = state.attachment(&self.name)?;
        attachment
            .signal_handlers
            .push((id, interface.to_owned(), member.to_owned(), handler));
        Ok(id)
    }

    fn unregister_signal_handler(&self, id: HandlerId) -> Result<(), BusError> {
        let mut state = self.inner.state.lock();
        let attachment = state.attachment(&self.name)?;
        let before = attachment.signal_handlers.len();
        attachment.signal_handlers.retain(|(hid, ..)| *hid != id);
        if attachment.signal_handlers.len() == before {
            return Err(BusError::NoSuchHandler);
        }
        Ok(())
    }

    fn add_method_handler(
        &self,
        path: &str,
        interface: &str,
        member: &str,
        handler: MethodHandler,
    ) -> Result<HandlerId, BusError> {
        let mut state = self.inner.state.lock();
        let id = state.handler_id();
        let attachment = state.attachment(&self.name)?;
        attachment.method_handlers.push((
            id,
            path.to_owned(),
            interface.to_owned(),
            member.to_owned(),
            handler,
        ));
        Ok(id)
    }

    fn remove_method_handler(&self, id: HandlerId) -> Result<(), BusError> {
        let mut state = self.inner.state.lock();
        let attachment = state.attachment(&self.name)?;
        let before = attachment.method_handlers.len();
        attachment.method_handlers.retain(|(hid, ..)| *hid != id);
        if attachment.method_handlers.len() == before {
            return Err(BusError::NoSuchHandler);
        }
        Ok(())
    }

    fn method_call(
        &self,
        peer: &str,
        session: SessionId,
        interface: &str,
        member: &str,
        args: &[Arg],
    ) -> Result<Vec<Arg>, BusError> {
        let handler = {
            let state = self.inner.state.lock();
            let record = state.sessions.get(&session.0).ok_or(BusError::NoSuchSession)?;
            if record.joiner != self.name || record.host != peer {
                return Err(BusError::NoSuchSession);
            }
            let attachment = state
                .attachments
                .get(peer)
                .filter(|a| a.connected)
                .ok_or_else(|| BusError::no_such_peer(peer))?;
            attachment
                .method_handlers
                .iter()
                .find(|(_, _, i, m, _)| i == interface && m == member)
                .map(|(.., handler)| handler.clone())
                .ok_or_else(|| BusError::NoSuchMethod {
                    interface: interface.to_owned(),
                    member: member.to_owned(),
                })?
        };
        // Handler runs on the caller's thread, with no registry lock held.
        handler(args)
    }

    fn join_session(&self, peer: &str, port: SessionPort) -> Result<SessionId, BusError> {
        let mut state = self.inner.state.lock();
        state.attachment(&self.name)?;
        let target = state
            .attachments
            .get(peer)
            .filter(|a| a.connected)
            .ok_or_else(|| BusError::no_such_peer(peer))?;
        if !target.bound_ports.contains(&port) {
            return Err(BusError::PortNotBound {
                name: peer.to_owned(),
                port,
            });
        }
        state.next_session += 1;
        let id = state.next_session;
        state.sessions.insert(
            id,
            SessionRecord {
                joiner: self.name.clone(),
                host: peer.to_owned(),
            },
        );
        Ok(SessionId(id))
    }

    fn leave_session(&self, session: SessionId) -> Result<(), BusError> {
        let mut state = self.inner.state.lock();
        state
            .sessions
            .remove(&session.0)
            .map(|_| ())
            .ok_or(BusError::NoSuchSession)
    }

    fn bind_session_port(&self, port: SessionPort) -> Result<(), BusError> {
        let mut state = self.inner.state.lock();
        state.attachment(&self.name)?.bound_ports.insert(port);
        Ok(())
    }

    fn add_match(&self, rule: &MatchRule) -> Result<(), BusError> {
        let mut state = self.inner.state.lock();
        state.attachment(&self.name)?.matches.push(rule.clone());
        Ok(())
    }

    fn remove_match(&self, rule: &MatchRule) -> Result<(), BusError> {
        let mut state = self.inner.state.lock();
        let attachment = state.attachment(&self.name)?;
        match attachment.matches.iter().position(|r| r == rule) {
            Some(index) => {
                attachment.matches.remove(index);
                Ok(())
            }
            None => Err(BusError::MatchNotFound {
                rule: rule.to_string(),
            }),
        }
    }

    fn advertise_name(&self, name: &str) -> Result<(), BusError> {
        let mut found = Vec::new();
        {
            let mut state = self.inner.state.lock();
            state.attachment(&self.name)?;
            state
                .advertised
                .insert(name.to_owned(), self.name.clone());
            for attachment in state.attachments.values() {
                if attachment.connected && attachment.finding.contains(name) {
                    for (_, listener) in &attachment.bus_listeners {
                        found.push((listener.clone(), name.to_owned()));
                    }
                }
            }
        }
        if !found.is_empty() {
            self.inner.emit(Event::Found(found));
        }
        Ok(())
    }

    fn cancel_advertise_name(&self, name: &str) -> Result<(), BusError> {
        let mut lost = Vec::new();
        {
            let mut state = self.inner.state.lock();
            if state.advertised.get(name).map(String::as_str) != Some(self.name.as_str()) {
                warn!(%name, "cancel_advertise_name: name not advertised here");
                return Ok(());
            }
            state.advertised.remove(name);
            for attachment in state.attachments.values() {
                if attachment.connected && attachment.finding.contains(name) {
                    for (_, listener) in &attachment.bus_listeners {
                        lost.push((listener.clone(), name.to_owned()));
                    }
                }
            }
        }
        if !lost.is_empty() {
            self.inner.emit(Event::Lost(lost));
        }
        Ok(())
    }

    fn find_advertised_name(&self, name: &str) -> Result<(), BusError> {
        let mut found = Vec::new();
        {
            let mut state = self.inner.state.lock();
            let already_advertised = state.advertised.contains_key(name);
            let attachment = state.attachment(&self.name)?;
            attachment.finding.insert(name.to_owned());
            if already_advertised {
                for (_, listener) in &attachment.bus_listeners {
                    found.push((listener.clone(), name.to_owned()));
                }
            }
        }
        if !found.is_empty() {
            self.inner.emit(Event::Found(found));
        }
        Ok(())
    }

    fn cancel_find_advertised_name(&self, name: &str) -> Result<(), BusError> {
        let mut state = self.inner.state.lock();
        state.attachment(&self.name)?.finding.remove(name);
        Ok(())
    }

    fn register_bus_listener(&self, listener: Arc<dyn BusListener>) -> HandlerId {
        let mut state = self.inner.state.lock();
        let id = state.handler_id();
        if let Ok(attachment) = state.attachment(&self.name) {
            attachment.bus_listeners.push((id, listener));
        }
        id
    }

    fn unregister_bus_listener(&self, id: HandlerId) {
        let mut state = self.inner.state.lock();
        if let Ok(attachment) = state.attachment(&self.name) {
            attachment.bus_listeners.retain(|(hid, _)| *hid != id);
        }
    }

    fn register_announce_listener(&self, listener: Arc<dyn AnnounceListener>) -> HandlerId {
        let mut state = self.inner.state.lock();
        let id = state.handler_id();
        if let Ok(attachment) = state.attachment(&self.name) {
            attachment.announce_listeners.push((id, listener));
        }
        id
    }

    fn unregister_announce_listener(&self, id: HandlerId) {
        let mut state = self.inner.state.lock();
        if let Ok(attachment) = state.attachment(&self.name) {
            attachment.announce_listeners.retain(|(hid, _)| *hid != id);
        }
    }

    fn who_implements(&self, interface: &str) -> Result<(), BusError> {
        let mut state = self.inner.state.lock();
        state
            .attachment(&self.name)?
            .who_implements
            .insert(interface.to_owned());
        Ok(())
    }

    fn announce(&self, object_description: &[(String, Vec<String>)]) -> Result<(), BusError> {
        let mut interested = Vec::new();
        {
            let mut state = self.inner.state.lock();
            state.attachment(&self.name)?;
            for (name, attachment) in &state.attachments {
                if name == &self.name || !attachment.connected {
                    continue;
                }
                let wants = object_description.iter().any(|(_, interfaces)| {
                    interfaces
                        .iter()
                        .any(|i| attachment.who_implements.contains(i))
                });
                if !wants {
                    continue;
                }
                for (_, listener) in &attachment.announce_listeners {
                    interested.push((
                        listener.clone(),
                        self.name.clone(),
                        object_description.to_vec(),
                    ));
                }
            }
        }
        if !interested.is_empty() {
            self.inner.emit(Event::Announce(interested));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn spec() -> SignalSpec {
        SignalSpec::new("/obj", "org.test.Iface", "ping")
    }

    #[test]
    fn signal_reaches_matching_subscriber_only() {
        let network = MemoryNetwork::new();
        let producer = network.connect();
        let consumer = network.connect();
        let bystander = network.connect();

        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        consumer
            .register_signal_handler(
                "org.test.Iface",
                "ping",
                Arc::new(move |_msg| {
                    hits2.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        consumer
            .add_match(&MatchRule::sessionless("org.test.Iface"))
            .unwrap();

        // Same handler but no match rule: must stay silent.
        let stray = Arc::new(AtomicUsize::new(0));
        let stray2 = stray.clone();
        bystander
            .register_signal_handler(
                "org.test.Iface",
                "ping",
                Arc::new(move |_msg| {
                    stray2.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        producer
            .send_signal(&spec(), &[Arg::I32(1)], 30, true)
            .unwrap();
        network.flush();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(stray.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn sender_scoped_match_filters_other_senders() {
        let network = MemoryNetwork::new();
        let wanted = network.connect();
        let unwanted = network.connect();
        let consumer = network.connect();

        let senders = Arc::new(Mutex::new(Vec::new()));
        let senders2 = senders.clone();
        consumer
            .register_signal_handler(
                "org.test.Iface",
                "ping",
                Arc::new(move |msg| {
                    senders2.lock().push(msg.sender.clone());
                }),
            )
            .unwrap();
        consumer
            .add_match(&MatchRule::from_sender("org.test.Iface", wanted.unique_name()))
            .unwrap();

        unwanted
            .send_signal(&spec(), &[], 30, true)
            .unwrap();
        wanted.send_signal(&spec(), &[], 30, true).unwrap();
        network.flush();

        assert_eq!(&*senders.lock(), &[wanted.unique_name()]);
    }

    #[test]
    fn cancel_sessionless_removes_pending_signal() {
        let network = MemoryNetwork::new();
        let producer = network.connect();

        let first = producer.send_signal(&spec(), &[], 30, true).unwrap();
        let second = producer.send_signal(&spec(), &[], 30, true).unwrap();
        assert_eq!(network.sessionless_snapshot().len(), 2);

        producer.cancel_sessionless(second).unwrap();
        let remaining = network.sessionless_snapshot();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].serial, first);

        assert!(matches!(
            producer.cancel_sessionless(second),
            Err(BusError::NoSuchSerial { .. })
        ));
    }

    #[test]
    fn method_call_requires_session_on_bound_port() {
        let network = MemoryNetwork::new();
        let host = network.connect();
        let caller = network.connect();

        host.add_method_handler(
            "/svc",
            "org.test.Iface",
            "Echo",
            Arc::new(|args| Ok(args.to_vec())),
        )
        .unwrap();

        assert!(matches!(
            caller.join_session(&host.unique_name(), 1010),
            Err(BusError::PortNotBound { .. })
        ));

        host.bind_session_port(1010).unwrap();
        let session = caller.join_session(&host.unique_name(), 1010).unwrap();
        let reply = caller
            .method_call(
                &host.unique_name(),
                session,
                "org.test.Iface",
                "Echo",
                &[Arg::I32(7)],
            )
            .unwrap();
        assert_eq!(reply, vec![Arg::I32(7)]);

        caller.leave_session(session).unwrap();
        assert!(matches!(
            caller.method_call(&host.unique_name(), session, "org.test.Iface", "Echo", &[]),
            Err(BusError::NoSuchSession)
        ));
    }

    #[test]
    fn advertised_name_found_and_lost() {
        let network = MemoryNetwork::new();
        let agent = network.connect();
        let seeker = network.connect();

        struct Recorder {
            found: Mutex<Vec<String>>,
            lost: Mutex<Vec<String>>,
        }
        impl BusListener for Recorder {
            fn found_advertised_name(&self, name: &str) {
                self.found.lock().push(name.to_owned());
            }
            fn lost_advertised_name(&self, name: &str) {
                self.lost.lock().push(name.to_owned());
            }
        }

        let recorder = Arc::new(Recorder {
            found: Mutex::new(Vec::new()),
            lost: Mutex::new(Vec::new()),
        });
        seeker.register_bus_listener(recorder.clone());
        seeker.find_advertised_name(&agent.unique_name()).unwrap();

        agent.advertise_name(&agent.unique_name()).unwrap();
        network.flush();
        assert_eq!(&*recorder.found.lock(), &[agent.unique_name()]);

        network.drop_peer(&agent.unique_name());
        network.flush();
        assert_eq!(&*recorder.lost.lock(), &[agent.unique_name()]);
    }

    #[test]
    fn announcements_reach_interested_peers() {
        let network = MemoryNetwork::new();
        let announcer = network.connect();
        let interested = network.connect();
        let uninterested = network.connect();

        struct Recorder(Mutex<Vec<String>>);
        impl AnnounceListener for Recorder {
            fn announced(&self, bus_name: &str, _desc: &[(String, Vec<String>)]) {
                self.0.lock().push(bus_name.to_owned());
            }
        }

        let hit = Arc::new(Recorder(Mutex::new(Vec::new())));
        interested.register_announce_listener(hit.clone());
        interested.who_implements("org.test.Agent").unwrap();

        let miss = Arc::new(Recorder(Mutex::new(Vec::new())));
        uninterested.register_announce_listener(miss.clone());

        announcer
            .announce(&[("/agent".to_owned(), vec!["org.test.Agent".to_owned()])])
            .unwrap();
        network.flush();

        assert_eq!(&*hit.0.lock(), &[announcer.unique_name()]);
        assert!(miss.0.lock().is_empty());
    }
}
