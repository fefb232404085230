use regex::Regex;

use crate::{Event, Result};

/// Selects the events a subscriber receives.
///
/// A filter holds up to two compiled patterns: one matched against the event
/// type tag and one against the stream name. An event passes when every
/// configured pattern matches. A filter with no pattern accepts everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    event_type: Option<Regex>,
    stream: Option<Regex>,
}

impl EventFilter {
    /// A filter accepting every event.
    pub fn all() -> Self {
        Self::default()
    }

    /// A filter on the event type tag.
    pub fn event_types(pattern: &str) -> Result<Self> {
        Ok(Self {
            event_type: Some(Regex::new(pattern)?),
            stream: None,
        })
    }

    /// A filter on the stream name.
    pub fn streams(pattern: &str) -> Result<Self> {
        Ok(Self {
            event_type: None,
            stream: Some(Regex::new(pattern)?),
        })
    }

    /// Additionally requires the event type to match `pattern`.
    pub fn and_event_types(mut self, pattern: &str) -> Result<Self> {
        self.event_type = Some(Regex::new(pattern)?);
        Ok(self)
    }

    /// Additionally requires the stream name to match `pattern`.
    pub fn and_streams(mut self, pattern: &str) -> Result<Self> {
        self.stream = Some(Regex::new(pattern)?);
        Ok(self)
    }

    /// Returns true if the filter accepts every event.
    pub fn is_all(&self) -> bool {
        self.event_type.is_none() && self.stream.is_none()
    }

    /// Returns true if `event` passes the filter.
    pub fn matches(&self, event: &Event) -> bool {
        self.matches_parts(event.stream_id.as_str(), &event.event_type)
    }

    /// Returns true if an event of `event_type` on `stream` passes the filter.
    pub fn matches_parts(&self, stream: &str, event_type: &str) -> bool {
        if let Some(ref pattern) = self.event_type
            && !pattern.is_match(event_type)
        {
            return false;
        }
        if let Some(ref pattern) = self.stream
            && !pattern.is_match(stream)
        {
            return false;
        }
        true
    }
}

impl std::fmt::Display for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let event_type = self.event_type.as_ref().map_or("*", |r| r.as_str());
        let stream = self.stream.as_ref().map_or("*", |r| r.as_str());
        write!(f, "type={event_type} stream={stream}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventStoreError;

    #[test]
    fn all_accepts_everything() {
        let filter = EventFilter::all();
        assert!(filter.is_all());
        assert!(filter.matches_parts("app-1", "AnythingHappened"));
    }

    #[test]
    fn event_type_pattern() {
        let filter = EventFilter::event_types("^Schema(Created|Deleted)$").unwrap();
        assert!(filter.matches_parts("app-1", "SchemaCreated"));
        assert!(filter.matches_parts("app-1", "SchemaDeleted"));
        assert!(!filter.matches_parts("app-1", "SchemaPublished"));
        assert!(!filter.matches_parts("app-1", "AppCreated"));
    }

    #[test]
    fn both_patterns_must_match() {
        let filter = EventFilter::streams("^app-")
            .unwrap()
            .and_event_types("Created$")
            .unwrap();
        assert!(filter.matches_parts("app-1", "SchemaCreated"));
        assert!(!filter.matches_parts("asset-1", "SchemaCreated"));
        assert!(!filter.matches_parts("app-1", "SchemaDeleted"));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let result = EventFilter::event_types("(unclosed");
        assert!(matches!(result, Err(EventStoreError::InvalidFilter(_))));
    }

    #[test]
    fn display_shows_patterns() {
        let filter = EventFilter::event_types("^Schema").unwrap();
        assert_eq!(filter.to_string(), "type=^Schema stream=*");
    }
}
