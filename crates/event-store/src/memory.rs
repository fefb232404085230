use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{RwLock, watch};

use crate::{
    CommitId, Event, EventData, EventFilter, EventStoreError, EventSubscription, GlobalPosition,
    Result, StreamId, SubscriptionOptions, Version,
    store::{AppendResult, EventStore, validate_events_for_append},
};

#[derive(Default)]
struct Log {
    /// Events in global order; the event at index `i` has position `i + 1`.
    events: Vec<Event>,

    /// Indexes into `events` per stream, in sequence order.
    streams: HashMap<StreamId, Vec<usize>>,
}

/// In-memory event store implementation.
///
/// Used by single-node deployments and tests. It provides the same interface
/// and guarantees as the PostgreSQL implementation, without durability.
#[derive(Clone)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<Log>>,
    head: Arc<watch::Sender<GlobalPosition>>,
    options: SubscriptionOptions,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::with_options(SubscriptionOptions::default())
    }

    /// Creates a new empty store whose subscriptions use `options`.
    pub fn with_options(options: SubscriptionOptions) -> Self {
        let (head, _) = watch::channel(GlobalPosition::START);
        Self {
            log: Arc::new(RwLock::new(Log::default())),
            head: Arc::new(head),
            options,
        }
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.log.read().await.events.len()
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    #[tracing::instrument(skip(self, events), fields(count = events.len()))]
    async fn append(
        &self,
        stream_id: &StreamId,
        expected_version: Version,
        events: Vec<EventData>,
    ) -> Result<AppendResult> {
        validate_events_for_append(&events)?;

        let mut log = self.log.write().await;

        let current_version = Version::new(
            log.streams
                .get(stream_id)
                .map_or(0, |indexes| indexes.len() as i64),
        );

        if current_version != expected_version {
            metrics::counter!("event_store_conflicts_total").increment(1);
            return Err(EventStoreError::ConcurrencyConflict {
                stream_id: stream_id.clone(),
                expected: expected_version,
                actual: current_version,
            });
        }

        let commit_id = CommitId::new();
        let timestamp = Utc::now();
        let count = events.len();
        let first_index = log.events.len();

        for (offset, data) in events.into_iter().enumerate() {
            let index = first_index + offset;
            let event = Event::from_data(
                data,
                stream_id.clone(),
                current_version.as_i64() + offset as i64,
                GlobalPosition::new(index as i64 + 1),
                commit_id,
                timestamp,
            );
            log.events.push(event);
        }
        log.streams
            .entry(stream_id.clone())
            .or_default()
            .extend(first_index..first_index + count);

        let last_position = GlobalPosition::new(log.events.len() as i64);
        drop(log);

        self.head.send_replace(last_position);
        metrics::counter!("events_appended_total").increment(count as u64);

        Ok(AppendResult {
            stream_id: stream_id.clone(),
            commit_id,
            version: current_version.advanced_by(count),
            first_position: GlobalPosition::new(first_index as i64 + 1),
            last_position,
        })
    }

    async fn read_stream(&self, stream_id: &StreamId, from_version: Version) -> Result<Vec<Event>> {
        let log = self.log.read().await;
        let Some(indexes) = log.streams.get(stream_id) else {
            return Ok(Vec::new());
        };
        let skip = from_version.as_i64().max(0) as usize;
        Ok(indexes
            .iter()
            .skip(skip)
            .map(|&i| log.events[i].clone())
            .collect())
    }

    async fn stream_version(&self, stream_id: &StreamId) -> Result<Version> {
        let log = self.log.read().await;
        Ok(Version::new(
            log.streams.get(stream_id).map_or(0, |i| i.len() as i64),
        ))
    }

    async fn read_all(&self, from: GlobalPosition, max_count: usize) -> Result<Vec<Event>> {
        let log = self.log.read().await;
        let start = (from.as_i64().max(1) - 1) as usize;
        Ok(log
            .events
            .iter()
            .skip(start)
            .take(max_count)
            .cloned()
            .collect())
    }

    async fn head_position(&self) -> Result<GlobalPosition> {
        Ok(*self.head.borrow())
    }

    fn subscribe(&self, from: GlobalPosition, filter: EventFilter) -> EventSubscription {
        EventSubscription::spawn(
            self.clone(),
            from,
            filter,
            self.head.subscribe(),
            self.options.clone(),
        )
    }
}
