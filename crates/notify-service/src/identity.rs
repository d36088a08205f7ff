//! Producer identity resolution.
//!
//! The device/app identity stamped into every outgoing notification comes
//! from the application's About/property store, which is an external
//! collaborator here. The trait exposes the one read the payload encoder
//! needs; wire-type and emptiness validation happens downstream in
//! [`notify_wire::IdentityArgs`].

use notify_wire::Arg;
use notify_wire::consts;

use crate::error::ServiceError;

/// Read access to the application's identity properties.
pub trait PropertyStore: Send + Sync {
    /// Return all properties as `(key, variant)` pairs; the encoder picks
    /// out DeviceId, DeviceName, AppId, and AppName.
    fn read_all(&self) -> Result<Vec<(String, Arg)>, ServiceError>;
}

/// Fixed in-memory property store for applications and tests.
#[derive(Debug, Clone)]
pub struct StaticPropertyStore {
    entries: Vec<(String, Arg)>,
}

impl StaticPropertyStore {
    pub fn new(
        device_id: impl Into<String>,
        device_name: impl Into<String>,
        app_id: [u8; consts::UUID_LENGTH],
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            entries: vec![
                (consts::PROP_DEVICE_ID.to_owned(), Arg::Str(device_id.into())),
                (
                    consts::PROP_DEVICE_NAME.to_owned(),
                    Arg::Str(device_name.into()),
                ),
                (consts::PROP_APP_ID.to_owned(), Arg::Bytes(app_id.to_vec())),
                (consts::PROP_APP_NAME.to_owned(), Arg::Str(app_name.into())),
            ],
        }
    }
}

impl PropertyStore for StaticPropertyStore {
    fn read_all(&self) -> Result<Vec<(String, Arg)>, ServiceError> {
        Ok(self.entries.clone())
    }
}
