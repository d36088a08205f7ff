//! # Notify Wire
//!
//! Wire-level value model and payload codec for the notification service.
//! This crate is pure data transformation: it maps the [`Notification`]
//! value object onto the bus's fixed positional argument list and back,
//! without performing any I/O.
//!
//! The argument layout is interoperability-critical and must be preserved
//! byte-for-byte:
//!
//! `[version, messageId, messageType, deviceId, deviceName, appId, appName,
//!   attributes, customAttributes, notificationText]`

pub mod codec;
pub mod consts;
pub mod notification;
pub mod value;

pub use codec::{IdentityArgs, MessageIdGenerator, decode, encode};
pub use notification::{
    MESSAGE_TYPE_CNT, MessageType, Notification, NotificationText, RichAudioUrl, RichContent,
};
pub use value::Arg;

use thiserror::Error;

/// Errors produced while marshalling or unmarshalling notification payloads.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("expected {expected} at {field}, found {found}")]
    UnexpectedType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{field} can not be empty")]
    EmptyField { field: &'static str },

    #[error("notification text must contain at least one entry")]
    EmptyText,

    #[error("text entry has an empty language or text value")]
    InvalidTextEntry,

    #[error("audio content entry has an empty language or url value")]
    InvalidAudioEntry,

    #[error("message type {0} is out of range")]
    InvalidMessageType(u16),

    #[error("ttl {0} is outside the allowed range [{min}, {max}]", min = consts::TTL_MIN, max = consts::TTL_MAX)]
    InvalidTtl(u16),

    #[error("app id length is {0}, expected {expected} bytes", expected = consts::UUID_LENGTH)]
    InvalidAppIdLength(usize),

    #[error("payload has {got} arguments, expected {expected}")]
    WrongArity { got: usize, expected: usize },

    #[error("property store is missing the `{0}` entry")]
    MissingProperty(&'static str),
}

/// Validate a time-to-live value against the protocol range.
pub fn validate_ttl(ttl: u16) -> Result<(), WireError> {
    if !(consts::TTL_MIN..=consts::TTL_MAX).contains(&ttl) {
        return Err(WireError::InvalidTtl(ttl));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_range_bounds() {
        assert!(validate_ttl(consts::TTL_MIN).is_ok());
        assert!(validate_ttl(consts::TTL_MAX).is_ok());
        assert!(matches!(
            validate_ttl(consts::TTL_MIN - 1),
            Err(WireError::InvalidTtl(29))
        ));
        assert!(matches!(
            validate_ttl(consts::TTL_MAX + 1),
            Err(WireError::InvalidTtl(43201))
        ));
    }
}
