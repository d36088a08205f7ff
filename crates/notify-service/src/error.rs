use notify_bus::BusError;
use notify_wire::WireError;
use thiserror::Error;

/// Errors surfaced by the notification service.
///
/// Validation errors come back synchronously from `send`/`dismiss` callers;
/// transport errors from whichever explicit call triggered them; lifecycle
/// errors replace what would otherwise be crashes. Failures inside the
/// background workers are logged, never returned — their callers are long
/// gone by the time the work runs.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("payload error: {source}")]
    Wire {
        #[from]
        source: WireError,
    },

    #[error("bus error: {source}")]
    Bus {
        #[from]
        source: BusError,
    },

    #[error("property store error: {reason}")]
    PropertyStore { reason: String },

    #[error("sender transport is not started")]
    SenderNotStarted,

    #[error("sending is disabled")]
    SendingDisabled,

    #[error("no message has been sent on this object, nothing to delete")]
    NothingToDelete,

    #[error("no pending message with id {message_id}")]
    NoSuchMessage { message_id: i32 },

    #[error("receiver transport already started")]
    ReceiverAlreadyStarted,

    #[error("a different bus attachment is already set")]
    BusMismatch,

    #[error("bus attachment is not connected")]
    NotConnected,
}

impl ServiceError {
    pub fn property_store(reason: impl Into<String>) -> Self {
        Self::PropertyStore {
            reason: reason.into(),
        }
    }
}
