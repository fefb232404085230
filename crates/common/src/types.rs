use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of an event stream.
///
/// One stream holds the events of exactly one aggregate instance, for example
/// `app-42`. The store treats the value as opaque text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Creates a stream ID from any string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Builds the conventional `<prefix>-<key>` stream name for an aggregate.
    pub fn for_aggregate(prefix: &str, key: impl std::fmt::Display) -> Self {
        Self(format!("{prefix}-{key}"))
    }

    /// Returns the stream name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the part before the first `-`, if any.
    pub fn category(&self) -> &str {
        self.0.split_once('-').map_or(self.0.as_str(), |(c, _)| c)
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StreamId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifies one atomic append. Every event written by the same call shares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(Uuid);

impl CommitId {
    /// Creates a new random commit ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a commit ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CommitId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a running node on the pub/sub fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Creates a new random node ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a node ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_id_for_aggregate_uses_prefix() {
        let id = StreamId::for_aggregate("app", 42);
        assert_eq!(id.as_str(), "app-42");
        assert_eq!(id.category(), "app");
    }

    #[test]
    fn stream_id_without_separator_is_its_own_category() {
        let id = StreamId::new("settings");
        assert_eq!(id.category(), "settings");
    }

    #[test]
    fn stream_id_serializes_as_plain_string() {
        let id = StreamId::from("app-blog");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"app-blog\"");
        let back: StreamId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn commit_ids_are_unique() {
        assert_ne!(CommitId::new(), CommitId::new());
    }

    #[test]
    fn node_id_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        assert_eq!(NodeId::from_uuid(uuid).as_uuid(), uuid);
    }
}
