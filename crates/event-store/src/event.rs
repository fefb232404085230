use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{CommitId, StreamId};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version of a stream, used for optimistic concurrency control.
///
/// The version is the number of events ever appended to the stream. A stream
/// that does not exist is at version 0; its first event has sequence 0 and
/// leaves it at version 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a stream that has no events.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Returns the version reached after appending `count` more events.
    pub fn advanced_by(&self, count: usize) -> Self {
        Self(self.0 + count as i64)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// Store-wide position of an event.
///
/// Positions establish a total order over all streams. `START` sits before
/// the first event, which receives position 1. Positions only grow but may
/// skip values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GlobalPosition(i64);

impl GlobalPosition {
    /// The position before any event.
    pub const START: GlobalPosition = GlobalPosition(0);

    /// Creates a position from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the position right after this one.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw position value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for GlobalPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for GlobalPosition {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// An event that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    /// Unique identifier, kept when the event is stored.
    pub event_id: EventId,

    /// The type tag of the event (e.g., "SchemaCreated").
    pub event_type: String,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    /// Additional metadata about the event.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventData {
    /// Creates event data from a type tag and a raw JSON payload.
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: event_type.into(),
            payload,
            metadata: HashMap::new(),
        }
    }

    /// Creates event data by serializing a payload.
    pub fn from_payload<T: Serialize>(
        event_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event_type, serde_json::to_value(payload)?))
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// An immutable stored event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event.
    pub event_id: EventId,

    /// The type tag of the event.
    pub event_type: String,

    /// The stream this event belongs to.
    pub stream_id: StreamId,

    /// Stream-local sequence number, contiguous from 0.
    pub sequence: i64,

    /// Store-wide position.
    pub position: GlobalPosition,

    /// When the event was stored.
    pub timestamp: DateTime<Utc>,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    /// Additional metadata about the event.
    pub metadata: HashMap<String, serde_json::Value>,

    /// The append call that wrote this event.
    pub commit_id: CommitId,
}

impl Event {
    /// Builds the stored form of `data`.
    pub fn from_data(
        data: EventData,
        stream_id: StreamId,
        sequence: i64,
        position: GlobalPosition,
        commit_id: CommitId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: data.event_id,
            event_type: data.event_type,
            stream_id,
            sequence,
            position,
            timestamp,
            payload: data.payload,
            metadata: data.metadata,
            commit_id,
        }
    }

    /// Returns the stream version reached once this event was appended.
    pub fn stream_version(&self) -> Version {
        Version::new(self.sequence + 1)
    }

    /// Deserializes the payload into a concrete type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Delivery wrapper handed to consumers.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// The delivered event.
    pub event: Event,

    /// True while the subscription is still catching up on history.
    pub replay: bool,

    /// When the envelope was handed out.
    pub delivered_at: DateTime<Utc>,
}

impl Envelope {
    /// Wraps a stored event for delivery.
    pub fn new(event: Event, replay: bool) -> Self {
        Self {
            event,
            replay,
            delivered_at: Utc::now(),
        }
    }

    /// Returns the global position of the wrapped event.
    pub fn position(&self) -> GlobalPosition {
        self.event.position
    }

    /// Returns the commit the wrapped event was written in.
    pub fn commit_id(&self) -> CommitId {
        self.event.commit_id
    }

    /// Returns the event type tag.
    pub fn event_type(&self) -> &str {
        &self.event.event_type
    }

    /// Returns the stream of the wrapped event.
    pub fn stream_id(&self) -> &StreamId {
        &self.event.stream_id
    }
}
