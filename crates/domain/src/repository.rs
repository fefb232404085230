//! Loading and saving aggregates through the event store.

use std::collections::HashMap;
use std::marker::PhantomData;

use event_store::{EventData, EventStore, Snapshot, StreamId, Version};
use pubsub::SnapshotCache;

use crate::aggregate::{Aggregate, DomainEvent};
use crate::command::CommandResult;
use crate::error::CommandError;

/// An aggregate rebuilt from its stream.
#[derive(Debug, Clone)]
pub struct Loaded<A> {
    pub stream_id: StreamId,
    pub aggregate: A,

    /// Stream version the state reflects.
    pub version: Version,
}

impl<A> Loaded<A> {
    /// Returns true if the stream has any events.
    pub fn exists(&self) -> bool {
        self.version > Version::initial()
    }
}

/// Reads and writes one aggregate type.
///
/// With a [`SnapshotCache`] the repository starts from the cached state and
/// only replays the events appended after it. Every load still reads the
/// stream tail, so a stale cache entry costs extra replay, never a wrong
/// state.
pub struct AggregateRepository<S, A> {
    store: S,
    cache: Option<SnapshotCache>,
    _aggregate: PhantomData<fn() -> A>,
}

impl<S: Clone, A> Clone for AggregateRepository<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            cache: self.cache.clone(),
            _aggregate: PhantomData,
        }
    }
}

impl<S, A> AggregateRepository<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: None,
            _aggregate: PhantomData,
        }
    }

    /// Uses `cache` for snapshots of this aggregate type.
    pub fn with_cache(mut self, cache: SnapshotCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Rebuilds the aggregate stored in `stream_id`.
    ///
    /// A stream without events yields the default state at version 0.
    #[tracing::instrument(skip(self), fields(aggregate = A::aggregate_type()))]
    pub async fn load(&self, stream_id: &StreamId) -> Result<Loaded<A>, CommandError> {
        let (mut aggregate, mut version) = match self.cached(stream_id).await {
            Some(cached) => cached,
            None => (A::default(), Version::initial()),
        };

        for event in self.store.read_stream(stream_id, version).await? {
            aggregate.apply(event.payload_as::<A::Event>()?);
            version = event.stream_version();
        }

        Ok(Loaded {
            stream_id: stream_id.clone(),
            aggregate,
            version,
        })
    }

    async fn cached(&self, stream_id: &StreamId) -> Option<(A, Version)> {
        let cache = self.cache.as_ref()?;
        let snapshot = cache.get(stream_id).await?;
        if snapshot.aggregate_type != A::aggregate_type() {
            return None;
        }

        let version = snapshot.version;
        match snapshot.into_state::<A>() {
            Ok(state) => Some((state, version)),
            Err(err) => {
                tracing::warn!(%stream_id, error = %err, "discarding unreadable snapshot");
                cache.evict(stream_id).await;
                None
            }
        }
    }

    /// Appends `events` on top of `loaded` and returns the new state.
    ///
    /// The append expects the stream to still be at `loaded.version`. No
    /// events means nothing is written.
    #[tracing::instrument(skip_all, fields(stream_id = %loaded.stream_id, count = events.len()))]
    pub async fn save(
        &self,
        loaded: Loaded<A>,
        events: Vec<A::Event>,
        metadata: &HashMap<String, serde_json::Value>,
    ) -> Result<(Loaded<A>, CommandResult), CommandError> {
        if events.is_empty() {
            let result = CommandResult::unchanged(loaded.stream_id.clone(), loaded.version);
            return Ok((loaded, result));
        }

        let mut data = Vec::with_capacity(events.len());
        for event in &events {
            let mut event_data = EventData::from_payload(event.event_type(), event)?;
            event_data.metadata.extend(metadata.clone());
            event_data.metadata.insert(
                "aggregate_type".to_string(),
                serde_json::json!(A::aggregate_type()),
            );
            data.push(event_data);
        }

        let Loaded {
            stream_id,
            mut aggregate,
            version,
        } = loaded;

        let append = self.store.append(&stream_id, version, data.clone()).await?;
        aggregate.apply_events(events);

        let loaded = Loaded {
            stream_id,
            aggregate,
            version: append.version,
        };
        self.refresh_cache(&loaded).await;

        Ok((loaded, CommandResult::appended(append, data)))
    }

    // The append already committed: cache trouble is logged, never returned.
    async fn refresh_cache(&self, loaded: &Loaded<A>) {
        let Some(cache) = &self.cache else {
            return;
        };

        let snapshot = match Snapshot::from_state(
            loaded.stream_id.clone(),
            A::aggregate_type(),
            loaded.version,
            &loaded.aggregate,
        ) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(
                    stream_id = %loaded.stream_id,
                    error = %err,
                    "failed to snapshot aggregate"
                );
                cache.evict(&loaded.stream_id).await;
                return;
            }
        };

        if let Err(err) = cache.publish_update(snapshot).await {
            tracing::warn!(
                stream_id = %loaded.stream_id,
                error = %err,
                "failed to invalidate peer caches"
            );
        }
    }
}
