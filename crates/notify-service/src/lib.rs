//! # Notify Service
//!
//! Sessionless publish/subscribe notification delivery over a message
//! bus. Producers emit notifications as sessionless signals with a
//! bounded TTL, one emitting object per severity type so a newer message
//! of the same type can replace the previous one. Consumers subscribe by
//! interface, decode off the dispatch thread, and can dismiss a message
//! asynchronously; the dismiss fans back to the originating producer (a
//! direct method call over a short-lived session) and to every other
//! consumer (a broadcast Dismiss signal).
//!
//! Consumers also take part in SuperAgent arbitration: when an
//! aggregating relay announces itself, a consumer collapses its broadcast
//! subscriptions into a single match scoped to that relay, and falls back
//! to direct delivery if the relay disappears.
//!
//! Entry point is [`NotificationService`]; the bus itself stays behind
//! the [`notify_bus::Bus`] trait.

pub mod consumer;
pub mod dismiss;
pub mod dismisser;
pub mod error;
pub mod identity;
pub mod producer;
pub mod producer_receiver;
pub mod receiver;
pub mod sender;
pub mod service;
pub mod superagent;
pub mod task_queue;
pub mod transport;

pub use error::ServiceError;
pub use identity::{PropertyStore, StaticPropertyStore};
pub use receiver::{NotificationReceiver, ReceivedNotification};
pub use sender::NotificationSender;
pub use service::NotificationService;
pub use transport::{CoordinatorState, Transport};

pub use notify_wire::{
    MessageType, Notification, NotificationText, RichAudioUrl, RichContent, WireError,
};
