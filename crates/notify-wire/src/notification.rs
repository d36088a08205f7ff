//! The notification value object and its component types.

use std::collections::BTreeMap;
use std::fmt;

use crate::WireError;
use crate::consts;

/// Message id value carried by a notification that was never sent.
pub const UNSET_MESSAGE_ID: i32 = -1;

/// Severity class of a notification. The ordinal selects the per-type
/// delivery channel on the producer side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    Emergency = 0,
    Warning = 1,
    Info = 2,
}

/// Number of message types, which is also the size of the producer slot table.
pub const MESSAGE_TYPE_CNT: usize = 3;

impl MessageType {
    /// All types in slot order.
    pub const ALL: [MessageType; MESSAGE_TYPE_CNT] =
        [MessageType::Emergency, MessageType::Warning, MessageType::Info];

    /// Lowercase name used as the per-type producer object path segment.
    pub fn path_name(self) -> &'static str {
        match self {
            MessageType::Emergency => "emergency",
            MessageType::Warning => "warning",
            MessageType::Info => "info",
        }
    }
}

impl TryFrom<u16> for MessageType {
    type Error = WireError;

    fn try_from(value: u16) -> Result<Self, WireError> {
        match value {
            0 => Ok(MessageType::Emergency),
            1 => Ok(MessageType::Warning),
            2 => Ok(MessageType::Info),
            other => Err(WireError::InvalidMessageType(other)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_name())
    }
}

/// One language/text pair. Every notification carries at least one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationText {
    pub language: String,
    pub text: String,
}

impl NotificationText {
    pub fn new(language: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            text: text.into(),
        }
    }
}

/// One language/url pair for rich audio content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RichAudioUrl {
    pub language: String,
    pub url: String,
}

impl RichAudioUrl {
    pub fn new(language: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            url: url.into(),
        }
    }
}

/// Optional rich-content pointers carried in the sparse attribute dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RichContent {
    pub icon_url: Option<String>,
    pub audio_url: Vec<RichAudioUrl>,
    pub icon_object_path: Option<String>,
    pub audio_object_path: Option<String>,
    pub control_panel_service_object_path: Option<String>,
}

impl RichContent {
    pub fn is_empty(&self) -> bool {
        self.icon_url.is_none()
            && self.audio_url.is_empty()
            && self.icon_object_path.is_none()
            && self.audio_object_path.is_none()
            && self.control_panel_service_object_path.is_none()
    }
}

/// One message to broadcast, or one message as reconstructed on receipt.
///
/// Producers build one with [`Notification::new`] and the `with_*` setters;
/// the codec rebuilds one from a received payload. All fields are owned, so
/// `Clone` gives an independent deep copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub version: u16,
    /// Producer-assigned id, [`UNSET_MESSAGE_ID`] until the message is sent.
    pub message_id: i32,
    pub message_type: MessageType,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    /// Uppercase hex rendering of the 16-byte app id.
    pub app_id: Option<String>,
    pub app_name: Option<String>,
    /// Bus name of the peer the payload arrived from.
    pub sender: Option<String>,
    /// Bus name of the producer that created the message, carried in the
    /// attribute dictionary so it survives SuperAgent re-publication.
    pub original_sender: Option<String>,
    pub custom_attributes: BTreeMap<String, String>,
    pub text: Vec<NotificationText>,
    pub rich: RichContent,
}

impl Notification {
    pub fn new(message_type: MessageType, text: Vec<NotificationText>) -> Self {
        Self {
            version: consts::NOTIFICATION_SERVICE_VERSION,
            message_id: UNSET_MESSAGE_ID,
            message_type,
            device_id: None,
            device_name: None,
            app_id: None,
            app_name: None,
            sender: None,
            original_sender: None,
            custom_attributes: BTreeMap::new(),
            text,
            rich: RichContent::default(),
        }
    }

    pub fn with_custom_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.custom_attributes = attributes;
        self
    }

    pub fn with_rich_icon_url(mut self, url: impl Into<String>) -> Self {
        self.rich.icon_url = Some(url.into());
        self
    }

    pub fn with_rich_audio_url(mut self, urls: Vec<RichAudioUrl>) -> Self {
        self.rich.audio_url = urls;
        self
    }

    pub fn with_rich_icon_object_path(mut self, path: impl Into<String>) -> Self {
        self.rich.icon_object_path = Some(path.into());
        self
    }

    pub fn with_rich_audio_object_path(mut self, path: impl Into<String>) -> Self {
        self.rich.audio_object_path = Some(path.into());
        self
    }

    pub fn with_control_panel_service_object_path(mut self, path: impl Into<String>) -> Self {
        self.rich.control_panel_service_object_path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_ordinals_are_wire_stable() {
        assert_eq!(MessageType::try_from(0).unwrap(), MessageType::Emergency);
        assert_eq!(MessageType::try_from(1).unwrap(), MessageType::Warning);
        assert_eq!(MessageType::try_from(2).unwrap(), MessageType::Info);
        assert!(matches!(
            MessageType::try_from(3),
            Err(WireError::InvalidMessageType(3))
        ));
    }

    #[test]
    fn clone_is_deep() {
        let mut a = Notification::new(
            MessageType::Info,
            vec![NotificationText::new("en", "hello")],
        )
        .with_rich_icon_url("http://icon");
        let b = a.clone();
        a.text[0].text.push_str(" world");
        a.rich.icon_url = None;
        assert_eq!(b.text[0].text, "hello");
        assert_eq!(b.rich.icon_url.as_deref(), Some("http://icon"));
    }
}
