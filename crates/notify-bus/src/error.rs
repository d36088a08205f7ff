use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("attachment is not connected")]
    Disconnected,

    #[error("no peer named `{name}` on the bus")]
    NoSuchPeer { name: String },

    #[error("peer `{name}` has not bound session port {port}")]
    PortNotBound { name: String, port: u16 },

    #[error("no such session")]
    NoSuchSession,

    #[error("no handler registered for {interface}.{member}")]
    NoSuchMethod { interface: String, member: String },

    #[error("no handler with that id")]
    NoSuchHandler,

    #[error("no pending sessionless message with serial {serial}")]
    NoSuchSerial { serial: u32 },

    #[error("match rule was never added: {rule}")]
    MatchNotFound { rule: String },

    #[error("invalid method arguments: {reason}")]
    InvalidArgs { reason: String },
}

impl BusError {
    pub fn no_such_peer(name: impl Into<String>) -> Self {
        Self::NoSuchPeer { name: name.into() }
    }

    pub fn invalid_args(reason: impl Into<String>) -> Self {
        Self::InvalidArgs {
            reason: reason.into(),
        }
    }
}
