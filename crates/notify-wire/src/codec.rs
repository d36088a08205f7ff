//! Payload codec: the bijective mapping between [`Notification`] and the
//! bus's positional argument list.
//!
//! Encoding fails before any argument is produced, so a failed call leaves
//! no partial payload behind. Decoding fails safe: the first argument with
//! an unexpected wire type aborts that message with an error the caller is
//! expected to log and drop.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};

use rand::Rng;
use tracing::debug;

use crate::consts::{
    self, CPS_OBJECT_PATH_ATTRIBUTE_KEY, ORIGINAL_SENDER_ATTRIBUTE_KEY,
    RICH_CONTENT_AUDIO_OBJECT_PATH_ATTRIBUTE_KEY, RICH_CONTENT_AUDIO_URL_ATTRIBUTE_KEY,
    RICH_CONTENT_ICON_OBJECT_PATH_ATTRIBUTE_KEY, RICH_CONTENT_ICON_URL_ATTRIBUTE_KEY,
};
use crate::notification::{MessageType, Notification, NotificationText, RichAudioUrl, RichContent};
use crate::value::Arg;
use crate::WireError;

/// Producer identity arguments, pre-resolved from the application's
/// property store and validated for wire type and non-emptiness.
#[derive(Debug, Clone)]
pub struct IdentityArgs {
    device_id: Arg,
    device_name: Arg,
    app_id: Arg,
    app_name: Arg,
}

impl IdentityArgs {
    /// Build directly from concrete values. The reduced validation mirrors
    /// the property-store path below.
    pub fn new(
        device_id: &str,
        device_name: &str,
        app_id: &[u8],
        app_name: &str,
    ) -> Result<Self, WireError> {
        Self::from_args(
            Arg::Str(device_id.to_owned()),
            Arg::Str(device_name.to_owned()),
            Arg::Bytes(app_id.to_vec()),
            Arg::Str(app_name.to_owned()),
        )
    }

    /// Extract DeviceId/DeviceName/AppId/AppName from a string-keyed
    /// variant list as read out of a property store, then validate that
    /// every argument has the expected wire type and is non-empty.
    pub fn from_properties(properties: &[(String, Arg)]) -> Result<Self, WireError> {
        let mut device_id = None;
        let mut device_name = None;
        let mut app_id = None;
        let mut app_name = None;

        for (key, value) in properties {
            match key.as_str() {
                consts::PROP_DEVICE_ID => device_id = Some(value.clone()),
                consts::PROP_DEVICE_NAME => device_name = Some(value.clone()),
                consts::PROP_APP_ID => app_id = Some(value.clone()),
                consts::PROP_APP_NAME => app_name = Some(value.clone()),
                _ => {}
            }
        }

        Self::from_args(
            device_id.ok_or(WireError::MissingProperty(consts::PROP_DEVICE_ID))?,
            device_name.ok_or(WireError::MissingProperty(consts::PROP_DEVICE_NAME))?,
            app_id.ok_or(WireError::MissingProperty(consts::PROP_APP_ID))?,
            app_name.ok_or(WireError::MissingProperty(consts::PROP_APP_NAME))?,
        )
    }

    fn from_args(
        device_id: Arg,
        device_name: Arg,
        app_id: Arg,
        app_name: Arg,
    ) -> Result<Self, WireError> {
        device_id.as_non_empty_str("deviceId")?;
        device_name.as_non_empty_str("deviceName")?;
        if app_id.as_bytes("appId")?.is_empty() {
            return Err(WireError::EmptyField { field: "appId" });
        }
        app_name.as_non_empty_str("appName")?;

        Ok(Self {
            device_id,
            device_name,
            app_id,
            app_name,
        })
    }

    pub fn app_id_bytes(&self) -> &[u8] {
        match &self.app_id {
            Arg::Bytes(b) => b,
            // from_args only admits the byte-array form.
            _ => unreachable!("appId validated at construction"),
        }
    }

    /// Uppercase hex rendering of the app id, as consumers will see it.
    pub fn app_id_hex(&self) -> String {
        hex::encode_upper(self.app_id_bytes())
    }
}

/// Produces the per-sender message id sequence: seeded randomly at
/// construction, then monotonically incremented per send.
#[derive(Debug)]
pub struct MessageIdGenerator {
    next: AtomicI32,
}

impl MessageIdGenerator {
    pub fn new() -> Self {
        let seed = rand::rng().random_range(1..i32::MAX);
        Self {
            next: AtomicI32::new(seed),
        }
    }

    pub fn next_id(&self) -> i32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for MessageIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Marshal a notification into the fixed ten-argument payload order.
#[allow(clippy::too_many_arguments)]
pub fn encode(
    version: u16,
    message_id: i32,
    message_type: MessageType,
    text: &[NotificationText],
    custom_attributes: &BTreeMap<String, String>,
    rich: &RichContent,
    original_sender: &str,
    identity: &IdentityArgs,
) -> Result<Vec<Arg>, WireError> {
    if text.is_empty() {
        return Err(WireError::EmptyText);
    }
    if text.iter().any(|t| t.language.is_empty() || t.text.is_empty()) {
        return Err(WireError::InvalidTextEntry);
    }
    if rich
        .audio_url
        .iter()
        .any(|a| a.language.is_empty() || a.url.is_empty())
    {
        return Err(WireError::InvalidAudioEntry);
    }

    let mut attributes = BTreeMap::new();
    attributes.insert(
        ORIGINAL_SENDER_ATTRIBUTE_KEY,
        Arg::Str(original_sender.to_owned()),
    );
    if let Some(url) = &rich.icon_url {
        attributes.insert(RICH_CONTENT_ICON_URL_ATTRIBUTE_KEY, Arg::Str(url.clone()));
    }
    if !rich.audio_url.is_empty() {
        let entries = rich
            .audio_url
            .iter()
            .map(|a| (a.language.clone(), a.url.clone()))
            .collect();
        attributes.insert(
            RICH_CONTENT_AUDIO_URL_ATTRIBUTE_KEY,
            Arg::StructArray(entries),
        );
    }
    if let Some(path) = &rich.icon_object_path {
        attributes.insert(
            RICH_CONTENT_ICON_OBJECT_PATH_ATTRIBUTE_KEY,
            Arg::Str(path.clone()),
        );
    }
    if let Some(path) = &rich.audio_object_path {
        attributes.insert(
            RICH_CONTENT_AUDIO_OBJECT_PATH_ATTRIBUTE_KEY,
            Arg::Str(path.clone()),
        );
    }
    if let Some(path) = &rich.control_panel_service_object_path {
        attributes.insert(CPS_OBJECT_PATH_ATTRIBUTE_KEY, Arg::Str(path.clone()));
    }

    let text_entries = text
        .iter()
        .map(|t| (t.language.clone(), t.text.clone()))
        .collect();

    Ok(vec![
        Arg::U16(version),
        Arg::I32(message_id),
        Arg::U16(message_type as u16),
        identity.device_id.clone(),
        identity.device_name.clone(),
        identity.app_id.clone(),
        identity.app_name.clone(),
        Arg::AttrDict(attributes),
        Arg::StrDict(custom_attributes.clone()),
        Arg::StructArray(text_entries),
    ])
}

/// Unmarshal a received payload back into a [`Notification`].
///
/// `sender` is the bus name the signal arrived from; the logical producer
/// is recovered from the ORIGINAL_SENDER attribute, which survives
/// SuperAgent re-publication.
pub fn decode(args: &[Arg], sender: &str) -> Result<Notification, WireError> {
    if args.len() != consts::NOTIFY_NUM_PARAMS {
        return Err(WireError::WrongArity {
            got: args.len(),
            expected: consts::NOTIFY_NUM_PARAMS,
        });
    }

    let version = args[0].as_u16("version")?;
    let message_id = args[1].as_i32("messageId")?;
    let message_type = MessageType::try_from(args[2].as_u16("messageType")?)?;
    let device_id = args[3].as_str("deviceId")?.to_owned();
    let device_name = args[4].as_str("deviceName")?.to_owned();

    let app_id_bytes = args[5].as_bytes("appId")?;
    if app_id_bytes.len() != consts::UUID_LENGTH {
        return Err(WireError::InvalidAppIdLength(app_id_bytes.len()));
    }
    let app_id = hex::encode_upper(app_id_bytes);

    let app_name = args[6].as_str("appName")?.to_owned();

    let mut rich = RichContent::default();
    let mut original_sender = None;
    for (key, value) in args[7].as_attr_dict("attributes")? {
        match *key {
            RICH_CONTENT_ICON_URL_ATTRIBUTE_KEY => {
                rich.icon_url = Some(value.as_str("richIconUrl")?.to_owned());
            }
            RICH_CONTENT_AUDIO_URL_ATTRIBUTE_KEY => {
                rich.audio_url = value
                    .as_struct_array("richAudioUrl")?
                    .iter()
                    .map(|(language, url)| RichAudioUrl::new(language.clone(), url.clone()))
                    .collect();
            }
            RICH_CONTENT_ICON_OBJECT_PATH_ATTRIBUTE_KEY => {
                rich.icon_object_path = Some(value.as_str("richIconObjectPath")?.to_owned());
            }
            RICH_CONTENT_AUDIO_OBJECT_PATH_ATTRIBUTE_KEY => {
                rich.audio_object_path = Some(value.as_str("richAudioObjectPath")?.to_owned());
            }
            CPS_OBJECT_PATH_ATTRIBUTE_KEY => {
                rich.control_panel_service_object_path =
                    Some(value.as_str("controlPanelServiceObjectPath")?.to_owned());
            }
            ORIGINAL_SENDER_ATTRIBUTE_KEY => {
                original_sender = Some(value.as_str("originalSender")?.to_owned());
            }
            other => {
                debug!(key = other, "skipping unknown notification attribute");
            }
        }
    }

    let custom_attributes = args[8].as_str_dict("customAttributes")?.clone();
    let text = args[9]
        .as_struct_array("notificationText")?
        .iter()
        .map(|(language, text)| NotificationText::new(language.clone(), text.clone()))
        .collect();

    Ok(Notification {
        version,
        message_id,
        message_type,
        device_id: Some(device_id),
        device_name: Some(device_name),
        app_id: Some(app_id),
        app_name: Some(app_name),
        sender: Some(sender.to_owned()),
        original_sender,
        custom_attributes,
        text,
        rich,
    })
}
