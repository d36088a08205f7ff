//! # Notify Bus
//!
//! The bus/session collaborator surface the notification transport is
//! written against. The real message bus (naming, session establishment,
//! security) lives behind the [`Bus`] trait; this crate only defines that
//! seam plus an in-process loopback implementation ([`memory`]) used by
//! the integration tests.
//!
//! Callback contract: signal handlers, announce listeners, and bus
//! listeners are invoked on the bus's dispatch thread. That thread is a
//! scarce resource — handlers must only enqueue work and return.

pub mod error;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use notify_wire::Arg;

pub use error::BusError;

/// Identifies a registered signal/method handler or listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u64);

/// An established point-to-point session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// A session port a peer can bind and others can join.
pub type SessionPort = u16;

/// Low-level serial number assigned to an outgoing signal, used to cancel
/// a still-pending sessionless message.
pub type SerialNumber = u32;

/// A signal as delivered to a registered handler.
#[derive(Debug, Clone)]
pub struct Message {
    /// Unique bus name of the emitting attachment.
    pub sender: String,
    pub serial: SerialNumber,
    /// Object path the signal was emitted from.
    pub path: String,
    pub args: Vec<Arg>,
}

/// Sessionless signal match rule, optionally scoped to a single sender.
///
/// The sender scoping is the SuperAgent arbitration primitive: a consumer
/// listening to an elected SuperAgent swaps its broadcast rules for one
/// rule pinned to that agent's bus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchRule {
    pub interface: String,
    pub sender: Option<String>,
}

impl MatchRule {
    /// Match every sessionless signal on `interface`.
    pub fn sessionless(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            sender: None,
        }
    }

    /// Match sessionless signals on `interface` from one specific sender.
    pub fn from_sender(interface: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            sender: Some(sender.into()),
        }
    }

    fn matches(&self, interface: &str, sender: &str) -> bool {
        self.interface == interface && self.sender.as_deref().is_none_or(|s| s == sender)
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type='signal',sessionless='t'")?;
        if let Some(sender) = &self.sender {
            write!(f, ",sender='{sender}'")?;
        }
        write!(f, ",interface='{}'", self.interface)
    }
}

/// Identifies the emitting object and interface member of a signal.
#[derive(Debug, Clone)]
pub struct SignalSpec {
    pub path: String,
    pub interface: String,
    pub member: String,
}

impl SignalSpec {
    pub fn new(
        path: impl Into<String>,
        interface: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            interface: interface.into(),
            member: member.into(),
        }
    }
}

/// Invoked on the dispatch thread for each matching signal.
pub type SignalHandler = Arc<dyn Fn(&Message) + Send + Sync>;

/// Invoked for an incoming method call; the returned args are the reply.
pub type MethodHandler = Arc<dyn Fn(&[Arg]) -> Result<Vec<Arg>, BusError> + Send + Sync>;

/// Advertised-name events, driven by `find_advertised_name`.
pub trait BusListener: Send + Sync {
    fn found_advertised_name(&self, name: &str);
    fn lost_advertised_name(&self, name: &str);
}

/// About/Announcement discovery events, driven by `who_implements`.
pub trait AnnounceListener: Send + Sync {
    /// `object_description` lists `(object path, implemented interfaces)`.
    fn announced(&self, bus_name: &str, object_description: &[(String, Vec<String>)]);
}

/// The transport abstraction provided by the underlying message bus.
pub trait Bus: Send + Sync {
    /// Unique bus name of this attachment (`:x.y` form).
    fn unique_name(&self) -> String;

    fn is_connected(&self) -> bool;

    /// Emit a signal; sessionless signals stay deliverable for `ttl`
    /// seconds or until cancelled by serial number.
    fn send_signal(
        &self,
        spec: &SignalSpec,
        args: &[Arg],
        ttl: u16,
        sessionless: bool,
    ) -> Result<SerialNumber, BusError>;

    /// Cancel a pending sessionless signal previously sent by this
    /// attachment.
    fn cancel_sessionless(&self, serial: SerialNumber) -> Result<(), BusError>;

    fn register_signal_handler(
        &self,
        interface: &str,
        member: &str,
        handler: SignalHandler,
    ) -> Result<HandlerId, BusError>;

    fn unregister_signal_handler(&self, id: HandlerId) -> Result<(), BusError>;

    fn add_method_handler(
        &self,
        path: &str,
        interface: &str,
        member: &str,
        handler: MethodHandler,
    ) -> Result<HandlerId, BusError>;

    fn remove_method_handler(&self, id: HandlerId) -> Result<(), BusError>;

    /// Synchronous remote method call over an established session.
    fn method_call(
        &self,
        peer: &str,
        session: SessionId,
        interface: &str,
        member: &str,
        args: &[Arg],
    ) -> Result<Vec<Arg>, BusError>;

    fn join_session(&self, peer: &str, port: SessionPort) -> Result<SessionId, BusError>;

    fn leave_session(&self, session: SessionId) -> Result<(), BusError>;

    fn bind_session_port(&self, port: SessionPort) -> Result<(), BusError>;

    fn add_match(&self, rule: &MatchRule) -> Result<(), BusError>;

    fn remove_match(&self, rule: &MatchRule) -> Result<(), BusError>;

    fn advertise_name(&self, name: &str) -> Result<(), BusError>;

    fn cancel_advertise_name(&self, name: &str) -> Result<(), BusError>;

    /// Start discovery of `name`; found/lost events arrive at registered
    /// bus listeners.
    fn find_advertised_name(&self, name: &str) -> Result<(), BusError>;

    fn cancel_find_advertised_name(&self, name: &str) -> Result<(), BusError>;

    fn register_bus_listener(&self, listener: Arc<dyn BusListener>) -> HandlerId;

    fn unregister_bus_listener(&self, id: HandlerId);

    fn register_announce_listener(&self, listener: Arc<dyn AnnounceListener>) -> HandlerId;

    fn unregister_announce_listener(&self, id: HandlerId);

    /// Subscribe to announcements of peers implementing `interface`.
    fn who_implements(&self, interface: &str) -> Result<(), BusError>;

    /// Broadcast this attachment's object description to interested peers.
    fn announce(&self, object_description: &[(String, Vec<String>)]) -> Result<(), BusError>;
}
