//! Event models carried by the queue and the codec used to store them.
//!
//! The queue treats payloads as opaque: any type implementing
//! [`QueuePayload`] can be queued. [`Pdu`] and [`Edu`] are the shapes used by
//! default and are enough for a federation sender that forwards events
//! verbatim.

use std::fmt;

use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{QueueError, QueueResult};

/// Well-known EDU types that influence expiry.
pub mod edu_types {
    /// Typing notifications.
    pub const TYPING: &str = "m.typing";
    /// Presence updates.
    pub const PRESENCE: &str = "m.presence";
    /// Read receipts.
    pub const RECEIPT: &str = "m.receipt";
    /// Send-to-device messages, required for end-to-end encryption.
    pub const DIRECT_TO_DEVICE: &str = "m.direct_to_device";
    /// Device list changes, required for end-to-end encryption.
    pub const DEVICE_LIST_UPDATE: &str = "m.device_list_update";
    /// Cross-signing key updates.
    pub const SIGNING_KEY_UPDATE: &str = "m.signing_key_update";
}

/// Which association table an operation works against.
///
/// Also stored on every payload row, so a payload queued as one kind can
/// never be associated as the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum EventKind {
    /// Durable room events.
    #[sea_orm(string_value = "pdu")]
    Pdu,
    /// Ephemeral signalling events.
    #[sea_orm(string_value = "edu")]
    Edu,
}

impl EventKind {
    /// Lower-case name used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Pdu => "pdu",
            EventKind::Edu => "edu",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of a remote homeserver that events are delivered to.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerName(String);

impl ServerName {
    /// Wraps a server name such as `example.org` or `example.org:8448`.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The server name as stored in the association tables.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServerName {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for ServerName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for ServerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A room event together with the room version needed to interpret it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pdu {
    pub room_version: String,
    pub event_id: String,
    pub room_id: String,
    pub sender: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub content: Value,
}

/// An ephemeral data unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edu {
    pub edu_type: String,
    pub origin: String,
    pub destination: String,
    pub content: Value,
}

/// Bound for anything the queue can store and hand back.
pub trait QueuePayload: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> QueuePayload for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Serializes an event into the bytes kept in `federation_queue_json`.
pub(crate) fn encode<T: QueuePayload>(event: &T) -> QueueResult<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(event)?)
}

/// Deserializes a stored payload. Failures are reported against the NID so the
/// corrupt row can be located.
pub(crate) fn decode<T: QueuePayload>(nid: i64, bytes: &[u8]) -> QueueResult<T> {
    rmp_serde::from_slice(bytes).map_err(|source| QueueError::Decode { nid, source })
}
