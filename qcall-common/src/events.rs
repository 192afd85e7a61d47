//! Push-channel message types
//!
//! The queue server pushes JSON messages of the form
//! `{type, data, currently_playing?, service_stats?}` over a persistent
//! socket. Only `queue_update` messages carry calls; every other type is
//! ignored by the announcer.
//!
//! Entries use snake_case field names on the wire. The camelCase spelling
//! used by older display pages is accepted as an alias.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{Error, Result};

/// Message type that carries ticket calls
pub const QUEUE_UPDATE: &str = "queue_update";

/// Server-side identifier (ticket, unit or service)
///
/// The server emits integer ids for some deployments and string ids for
/// others; both are normalised to their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Int(i64),
            Text(String),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Int(n) => EntityId(n.to_string()),
            Repr::Text(s) => EntityId(s),
        })
    }
}

/// A "ticket called" event
///
/// Immutable value received from the push channel. Two events for the same
/// ticket with different `last_called_at` are distinct announcements (a recall).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEvent {
    #[serde(alias = "ticketId")]
    pub ticket_id: EntityId,

    #[serde(alias = "ticketCode", default, deserialize_with = "null_as_default")]
    pub ticket_code: String,

    #[serde(alias = "unitId", default)]
    pub unit_id: Option<EntityId>,

    #[serde(alias = "unitName", default, deserialize_with = "null_as_default")]
    pub unit_name: String,

    #[serde(alias = "serviceId", default)]
    pub service_id: Option<EntityId>,

    #[serde(alias = "serviceName", default, deserialize_with = "null_as_default")]
    pub service_name: String,

    #[serde(alias = "counterLabel", default, deserialize_with = "null_as_default")]
    pub counter_label: String,

    #[serde(alias = "lastCalledAt")]
    pub last_called_at: DateTime<Utc>,

    #[serde(
        alias = "shouldPlayAudio",
        default = "default_true",
        deserialize_with = "null_as_true"
    )]
    pub should_play_audio: bool,

    /// Ordered announcement clip paths, as sent by the server
    #[serde(
        alias = "audio_paths",
        alias = "audioPaths",
        alias = "clipKeys",
        default,
        deserialize_with = "null_as_default"
    )]
    pub clip_keys: Vec<String>,
}

impl CallEvent {
    /// Dedup identity of this announcement
    pub fn announcement_key(&self) -> AnnouncementKey {
        AnnouncementKey {
            ticket_id: self.ticket_id.clone(),
            last_called_at: self.last_called_at,
        }
    }
}

/// Composite dedup identity: (ticket id, last called at)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnnouncementKey {
    pub ticket_id: EntityId,
    pub last_called_at: DateTime<Utc>,
}

/// Raw envelope as it arrives on the socket
#[derive(Debug, Clone, Deserialize)]
pub struct PushEnvelope {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub data: Option<Value>,

    #[serde(default)]
    pub currently_playing: Option<Value>,

    #[serde(default)]
    pub service_stats: Option<Value>,
}

/// Parsed content of a `queue_update` message
#[derive(Debug, Clone, PartialEq)]
pub struct QueueUpdate {
    /// Recently called tickets shown on the board, in server order
    pub board: Vec<CallEvent>,

    /// The call to announce, `None` meaning "clear display, no announcement"
    pub currently_playing: Option<CallEvent>,

    /// Number of `data` entries that could not be mapped and were skipped
    pub dropped_entries: usize,
}

/// Result of parsing one push message
#[derive(Debug, Clone, PartialEq)]
pub enum PushPayload {
    QueueUpdate(QueueUpdate),
    /// Any message type the announcer does not consume
    Ignored(String),
}

/// Parse one text frame from the push channel
///
/// A frame that is not JSON, or whose `currently_playing` object is
/// malformed, is rejected as a whole. Malformed `data` entries are skipped
/// individually and counted in [`QueueUpdate::dropped_entries`].
pub fn parse_push_message(text: &str) -> Result<PushPayload> {
    let envelope: PushEnvelope = serde_json::from_str(text)?;

    if envelope.kind != QUEUE_UPDATE {
        return Ok(PushPayload::Ignored(envelope.kind));
    }

    let currently_playing = match envelope.currently_playing {
        None | Some(Value::Null) => None,
        Some(value) => Some(serde_json::from_value::<CallEvent>(value).map_err(|e| {
            Error::Protocol(format!("invalid currently_playing: {}", e))
        })?),
    };

    let mut board = Vec::new();
    let mut dropped_entries = 0;

    match envelope.data {
        None | Some(Value::Null) => {}
        Some(Value::Array(entries)) => {
            for (index, entry) in entries.into_iter().enumerate() {
                match serde_json::from_value::<CallEvent>(entry) {
                    Ok(call) => board.push(call),
                    Err(e) => {
                        warn!(index, error = %e, "Skipping malformed queue_update entry");
                        dropped_entries += 1;
                    }
                }
            }
        }
        Some(other) => {
            return Err(Error::Protocol(format!(
                "queue_update data must be a list, got {}",
                json_kind(&other)
            )));
        }
    }

    Ok(PushPayload::QueueUpdate(QueueUpdate {
        board,
        currently_playing,
        dropped_entries,
    }))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn default_true() -> bool {
    true
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_true<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
}
