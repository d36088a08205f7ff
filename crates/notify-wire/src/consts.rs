//! Protocol constants shared by producers and consumers.
//!
//! Values here are part of the wire contract and must agree with every
//! other implementation on the bus.

/// Minimum time-to-live for a notification, in seconds.
pub const TTL_MIN: u16 = 30;
/// Maximum time-to-live for a notification, in seconds.
pub const TTL_MAX: u16 = 43200;

/// App ids are raw UUIDs on the wire.
pub const UUID_LENGTH: usize = 16;

/// Version stamped into every outgoing notification payload.
pub const NOTIFICATION_SERVICE_VERSION: u16 = 2;

/// Session port bound by producers for direct producer<->consumer sessions.
pub const PRODUCER_SERVICE_PORT: u16 = 1010;

/// Arity of the notify signal.
pub const NOTIFY_NUM_PARAMS: usize = 10;
/// Arity of the dismiss signal.
pub const DISMISSER_NUM_PARAMS: usize = 2;

/// Sparse attribute dictionary keys (argument 7 of the notify signal).
pub const RICH_CONTENT_ICON_URL_ATTRIBUTE_KEY: i32 = 0;
pub const RICH_CONTENT_AUDIO_URL_ATTRIBUTE_KEY: i32 = 1;
pub const RICH_CONTENT_ICON_OBJECT_PATH_ATTRIBUTE_KEY: i32 = 2;
pub const RICH_CONTENT_AUDIO_OBJECT_PATH_ATTRIBUTE_KEY: i32 = 3;
pub const CPS_OBJECT_PATH_ATTRIBUTE_KEY: i32 = 4;
pub const ORIGINAL_SENDER_ATTRIBUTE_KEY: i32 = 5;

pub const NOTIFICATION_INTERFACE_NAME: &str = "org.alljoyn.Notification";
pub const SUPERAGENT_INTERFACE_NAME: &str = "org.alljoyn.Notification.Superagent";
pub const PRODUCER_INTERFACE_NAME: &str = "org.alljoyn.Notification.Producer";
pub const DISMISSER_INTERFACE_NAME: &str = "org.alljoyn.Notification.Dismisser";

pub const NOTIFY_SIGNAL_NAME: &str = "notify";
pub const DISMISS_METHOD_NAME: &str = "Dismiss";
pub const DISMISS_SIGNAL_NAME: &str = "Dismiss";

pub const PRODUCER_SERVICE_PATH_PREFIX: &str = "/";
pub const PRODUCER_PATH: &str = "/notificationProducer";
pub const DISMISSER_PATH: &str = "/notificationDismisser";

/// Property-store keys for the producer identity arguments.
pub const PROP_DEVICE_ID: &str = "DeviceId";
pub const PROP_DEVICE_NAME: &str = "DeviceName";
pub const PROP_APP_ID: &str = "AppId";
pub const PROP_APP_NAME: &str = "AppName";
