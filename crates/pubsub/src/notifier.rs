//! Announcing appended events to every node.

use std::sync::Arc;

use async_trait::async_trait;
use event_store::{
    AppendResult, Event, EventData, EventFilter, EventStore, EventSubscription, GlobalPosition,
    StreamId, Version,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::{PubSub, PubSubExt, Result};

/// Topic carrying [`StreamUpdated`] notifications.
pub const EVENTS_TOPIC: &str = "events.appended";

/// Notification that a stream received new events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamUpdated {
    pub stream_id: StreamId,
    pub version: Version,
    pub position: GlobalPosition,
}

impl From<&AppendResult> for StreamUpdated {
    fn from(result: &AppendResult) -> Self {
        Self {
            stream_id: result.stream_id.clone(),
            version: result.version,
            position: result.last_position,
        }
    }
}

/// Publishes and receives [`StreamUpdated`] notifications.
#[derive(Clone)]
pub struct EventNotifier {
    pubsub: Arc<dyn PubSub>,
}

impl EventNotifier {
    pub fn new(pubsub: Arc<dyn PubSub>) -> Self {
        Self { pubsub }
    }

    /// Announces a successful append.
    pub async fn notify(&self, result: &AppendResult) -> Result<()> {
        self.pubsub
            .publish_json(EVENTS_TOPIC, &StreamUpdated::from(result))
            .await
    }

    /// Wakes `store`'s local subscriptions whenever another node appends.
    ///
    /// Notifications published by this node are ignored; the local store
    /// already knows about its own appends.
    pub async fn spawn_head_listener<S>(&self, store: S) -> Result<JoinHandle<()>>
    where
        S: EventStore + 'static,
    {
        let mut messages = self.pubsub.subscribe(EVENTS_TOPIC).await?;
        let own = self.pubsub.node_id();

        Ok(tokio::spawn(async move {
            while let Some(message) = messages.next().await {
                if message.origin == own {
                    continue;
                }
                match message.decode::<StreamUpdated>() {
                    Ok(update) => {
                        tracing::trace!(
                            stream_id = %update.stream_id,
                            position = %update.position,
                            "remote append"
                        );
                        store.observe_head(update.position);
                    }
                    Err(err) => tracing::warn!(error = %err, "malformed stream notification"),
                }
            }
            tracing::debug!("event notification stream ended");
        }))
    }
}

/// Event store decorator announcing every successful append.
///
/// The notification is sent after the append committed. A failed
/// notification is logged and never fails the append: subscribers on other
/// nodes still pick the events up on their next poll.
#[derive(Clone)]
pub struct NotifyingEventStore<S> {
    inner: S,
    notifier: EventNotifier,
}

impl<S: EventStore> NotifyingEventStore<S> {
    pub fn new(inner: S, notifier: EventNotifier) -> Self {
        Self { inner, notifier }
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: EventStore> EventStore for NotifyingEventStore<S> {
    async fn append(
        &self,
        stream_id: &StreamId,
        expected_version: Version,
        events: Vec<EventData>,
    ) -> event_store::Result<AppendResult> {
        let result = self.inner.append(stream_id, expected_version, events).await?;
        if let Err(err) = self.notifier.notify(&result).await {
            tracing::warn!(%stream_id, error = %err, "failed to announce append");
        }
        Ok(result)
    }

    async fn read_stream(
        &self,
        stream_id: &StreamId,
        from_version: Version,
    ) -> event_store::Result<Vec<Event>> {
        self.inner.read_stream(stream_id, from_version).await
    }

    async fn stream_version(&self, stream_id: &StreamId) -> event_store::Result<Version> {
        self.inner.stream_version(stream_id).await
    }

    async fn read_all(
        &self,
        from: GlobalPosition,
        max_count: usize,
    ) -> event_store::Result<Vec<Event>> {
        self.inner.read_all(from, max_count).await
    }

    async fn head_position(&self) -> event_store::Result<GlobalPosition> {
        self.inner.head_position().await
    }

    fn subscribe(&self, from: GlobalPosition, filter: EventFilter) -> EventSubscription {
        self.inner.subscribe(from, filter)
    }

    fn observe_head(&self, position: GlobalPosition) {
        self.inner.observe_head(position);
    }
}
