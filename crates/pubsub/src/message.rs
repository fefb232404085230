//! Messages and the publish/subscribe contract.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::NodeId;
use futures_core::Stream;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::Result;

/// A message travelling on one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Topic the message was published on.
    pub topic: String,

    /// Node that published the message.
    pub origin: NodeId,

    /// Message body.
    pub payload: serde_json::Value,

    /// When the message was published.
    pub published_at: DateTime<Utc>,
}

impl Message {
    /// Creates a message stamped with the current time.
    pub fn new(topic: impl Into<String>, origin: NodeId, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            origin,
            payload,
            published_at: Utc::now(),
        }
    }

    /// Deserializes the payload into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// A stream of messages from one subscription.
pub type MessageStream = Pin<Box<dyn Stream<Item = Message> + Send>>;

/// Topic-based publish/subscribe transport.
///
/// Delivery is best-effort: subscribers may miss messages (slow consumers,
/// transport reconnects) and there is no ordering across topics. Anything
/// built on top must be able to recover from the source of truth.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Returns the identity of this node on the fabric.
    fn node_id(&self) -> NodeId;

    /// Publishes a message to every current subscriber of `topic`.
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()>;

    /// Subscribes to `topic`. Only messages published after the call returns
    /// are delivered.
    async fn subscribe(&self, topic: &str) -> Result<MessageStream>;
}

/// Extension trait providing convenience methods for pub/sub transports.
#[async_trait]
pub trait PubSubExt: PubSub {
    /// Serializes and publishes a typed message.
    async fn publish_json<T: Serialize + Sync>(&self, topic: &str, message: &T) -> Result<()> {
        let payload = serde_json::to_value(message)?;
        self.publish(topic, payload).await
    }
}

impl<T: PubSub + ?Sized> PubSubExt for T {}

#[async_trait]
impl<T: PubSub + ?Sized> PubSub for Arc<T> {
    fn node_id(&self) -> NodeId {
        (**self).node_id()
    }

    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()> {
        (**self).publish(topic, payload).await
    }

    async fn subscribe(&self, topic: &str) -> Result<MessageStream> {
        (**self).subscribe(topic).await
    }
}
