//! In-process transport for single-node deployments and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::NodeId;
use futures_util::StreamExt;
use tokio::sync::{Mutex, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::{Message, MessageStream, PubSub, Result};

/// Messages buffered per topic before slow subscribers start losing them.
pub const DEFAULT_TOPIC_CAPACITY: usize = 1024;

struct Bus {
    topics: Mutex<HashMap<String, broadcast::Sender<Message>>>,
    capacity: usize,
}

impl Bus {
    async fn sender(&self, topic: &str) -> broadcast::Sender<Message> {
        let mut topics = self.topics.lock().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

/// In-process pub/sub over tokio broadcast channels.
///
/// Publishing never waits for subscribers. A subscriber that falls more than
/// the topic capacity behind skips the oldest messages.
#[derive(Clone)]
pub struct InMemoryPubSub {
    node_id: NodeId,
    bus: Arc<Bus>,
}

impl InMemoryPubSub {
    /// Creates a new bus with the default per-topic capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    /// Creates a new bus buffering up to `capacity` messages per topic.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            node_id: NodeId::new(),
            bus: Arc::new(Bus {
                topics: Mutex::new(HashMap::new()),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Returns a handle on the same bus acting as another node.
    pub fn peer(&self) -> Self {
        Self {
            node_id: NodeId::new(),
            bus: Arc::clone(&self.bus),
        }
    }
}

impl Default for InMemoryPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSub for InMemoryPubSub {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()> {
        let sender = self.bus.sender(topic).await;
        // No receivers is not an error: nobody is interested yet
        let receivers = sender
            .send(Message::new(topic, self.node_id, payload))
            .unwrap_or(0);
        tracing::trace!(topic, receivers, "message published");
        metrics::counter!("pubsub_messages_published_total").increment(1);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<MessageStream> {
        let receiver = self.bus.sender(topic).await.subscribe();
        let topic = topic.to_string();
        let stream = BroadcastStream::new(receiver).filter_map(move |item| {
            let topic = topic.clone();
            async move {
                match item {
                    Ok(message) => Some(message),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(%topic, skipped, "subscriber lagged, messages dropped");
                        metrics::counter!("pubsub_messages_dropped_total").increment(skipped);
                        None
                    }
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::PubSubExt;

    async fn next(stream: &mut MessageStream) -> Message {
        tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out")
            .expect("stream ended")
    }

    #[tokio::test]
    async fn subscriber_receives_published_message() {
        let pubsub = InMemoryPubSub::new();
        let mut stream = pubsub.subscribe("greetings").await.unwrap();

        pubsub
            .publish("greetings", serde_json::json!({"hello": "world"}))
            .await
            .unwrap();

        let message = next(&mut stream).await;
        assert_eq!(message.topic, "greetings");
        assert_eq!(message.origin, pubsub.node_id());
        assert_eq!(message.payload, serde_json::json!({"hello": "world"}));
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let pubsub = InMemoryPubSub::new();
        let mut a = pubsub.subscribe("a").await.unwrap();

        pubsub.publish_json("b", &"ignored").await.unwrap();
        pubsub.publish_json("a", &"wanted").await.unwrap();

        let message = next(&mut a).await;
        assert_eq!(message.payload, serde_json::json!("wanted"));
    }

    #[tokio::test]
    async fn peers_share_the_bus_with_distinct_identities() {
        let node_a = InMemoryPubSub::new();
        let node_b = node_a.peer();
        assert_ne!(node_a.node_id(), node_b.node_id());

        let mut on_b = node_b.subscribe("events").await.unwrap();
        node_a.publish_json("events", &1).await.unwrap();

        let message = next(&mut on_b).await;
        assert_eq!(message.origin, node_a.node_id());
    }

    #[tokio::test]
    async fn publishing_without_subscribers_succeeds() {
        let pubsub = InMemoryPubSub::new();
        assert!(pubsub.publish_json("nobody", &0).await.is_ok());
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_oldest_messages() {
        let pubsub = InMemoryPubSub::with_capacity(2);
        let mut stream = pubsub.subscribe("burst").await.unwrap();

        for i in 0..5 {
            pubsub.publish_json("burst", &i).await.unwrap();
        }

        let first = next(&mut stream).await;
        assert_eq!(first.payload, serde_json::json!(3));
        let second = next(&mut stream).await;
        assert_eq!(second.payload, serde_json::json!(4));
    }
}
