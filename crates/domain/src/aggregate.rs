//! Core aggregate and domain event traits.

use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name stored alongside the payload.
    ///
    /// Consumers filter on this name, so it must stay stable.
    fn event_type(&self) -> &'static str;
}

/// Trait for aggregates in an event-sourced system.
///
/// An aggregate owns one stream. Its state is rebuilt by replaying the
/// stream's events through [`apply`](Aggregate::apply), which must be pure
/// and infallible. The state is also serializable so it can be cached as a
/// snapshot.
pub trait Aggregate: Default + Clone + Serialize + DeserializeOwned + Send + Sync {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors returned when a command is refused.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Stream category of this aggregate: streams are named `<category>-<key>`.
    fn stream_category() -> &'static str;

    /// Applies an event to the aggregate, updating its state.
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}
