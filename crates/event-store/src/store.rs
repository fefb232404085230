use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    CommitId, Event, EventData, EventFilter, EventStoreError, EventSubscription, GlobalPosition,
    Result, StreamId, Version,
};

/// Number of events fetched per batch by [`EventStoreExt::read_all_events`].
pub const DEFAULT_READ_BATCH: usize = 512;

/// Outcome of a successful append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendResult {
    /// The stream that was appended to.
    pub stream_id: StreamId,

    /// Identifier shared by all events of the batch.
    pub commit_id: CommitId,

    /// The stream version after the append.
    pub version: Version,

    /// Global position of the first appended event.
    pub first_position: GlobalPosition,

    /// Global position of the last appended event.
    pub last_position: GlobalPosition,
}

/// Core trait for event store implementations.
///
/// An event store is an append-only log of events grouped into streams.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to a stream.
    ///
    /// Events are appended atomically - either all succeed or none do.
    /// Fails with `ConcurrencyConflict`, leaving the store unchanged, unless
    /// `expected_version` equals the current version of the stream.
    async fn append(
        &self,
        stream_id: &StreamId,
        expected_version: Version,
        events: Vec<EventData>,
    ) -> Result<AppendResult>;

    /// Retrieves the events of one stream with `sequence >= from_version`.
    ///
    /// Reading from the stream's current version yields nothing, so passing
    /// a cached version returns exactly the events written since.
    async fn read_stream(&self, stream_id: &StreamId, from_version: Version) -> Result<Vec<Event>>;

    /// Returns the current version of a stream (0 if it does not exist).
    async fn stream_version(&self, stream_id: &StreamId) -> Result<Version>;

    /// Retrieves up to `max_count` events with `position >= from`, in global order.
    async fn read_all(&self, from: GlobalPosition, max_count: usize) -> Result<Vec<Event>>;

    /// Returns the position of the last committed event.
    async fn head_position(&self) -> Result<GlobalPosition>;

    /// Subscribes to events with `position >= from` that pass `filter`.
    ///
    /// The subscription first delivers history, signals when it caught up,
    /// then keeps delivering events as they are appended. Dropping it stops
    /// the underlying reader.
    fn subscribe(&self, from: GlobalPosition, filter: EventFilter) -> EventSubscription;

    /// Informs the store that events up to `position` exist elsewhere.
    ///
    /// Used by notifiers to wake local subscriptions after a remote append.
    fn observe_head(&self, _position: GlobalPosition) {}
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Appends a single event to a stream.
    async fn append_event(
        &self,
        stream_id: &StreamId,
        expected_version: Version,
        event: EventData,
    ) -> Result<AppendResult> {
        self.append(stream_id, expected_version, vec![event]).await
    }

    /// Checks if a stream exists (has any events).
    async fn stream_exists(&self, stream_id: &StreamId) -> Result<bool> {
        Ok(self.stream_version(stream_id).await? > Version::initial())
    }

    /// Reads every event from `from` up to the head observed at call time.
    async fn read_all_events(&self, from: GlobalPosition) -> Result<Vec<Event>> {
        let head = self.head_position().await?;
        let mut events = Vec::new();
        let mut next = from;

        while next <= head {
            let batch = self.read_all(next, DEFAULT_READ_BATCH).await?;
            let Some(last) = batch.last() else {
                break;
            };
            next = last.position.next();
            events.extend(batch.into_iter().filter(|e| e.position <= head));
        }

        Ok(events)
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

#[async_trait]
impl<T: EventStore + ?Sized> EventStore for Arc<T> {
    async fn append(
        &self,
        stream_id: &StreamId,
        expected_version: Version,
        events: Vec<EventData>,
    ) -> Result<AppendResult> {
        (**self).append(stream_id, expected_version, events).await
    }

    async fn read_stream(&self, stream_id: &StreamId, from_version: Version) -> Result<Vec<Event>> {
        (**self).read_stream(stream_id, from_version).await
    }

    async fn stream_version(&self, stream_id: &StreamId) -> Result<Version> {
        (**self).stream_version(stream_id).await
    }

    async fn read_all(&self, from: GlobalPosition, max_count: usize) -> Result<Vec<Event>> {
        (**self).read_all(from, max_count).await
    }

    async fn head_position(&self) -> Result<GlobalPosition> {
        (**self).head_position().await
    }

    fn subscribe(&self, from: GlobalPosition, filter: EventFilter) -> EventSubscription {
        (**self).subscribe(from, filter)
    }

    fn observe_head(&self, position: GlobalPosition) {
        (**self).observe_head(position)
    }
}

/// Validates events before appending.
pub fn validate_events_for_append(events: &[EventData]) -> Result<()> {
    if events.is_empty() {
        return Err(EventStoreError::InvalidAppend(
            "Cannot append empty event list".to_string(),
        ));
    }

    if let Some(event) = events.iter().find(|e| e.event_type.trim().is_empty()) {
        return Err(EventStoreError::InvalidAppend(format!(
            "Event {} has an empty event type",
            event.event_id
        )));
    }

    Ok(())
}
