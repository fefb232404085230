//! PostgreSQL `LISTEN/NOTIFY` transport.

use async_trait::async_trait;
use common::NodeId;
use futures_util::StreamExt;
use sqlx::PgPool;
use sqlx::postgres::PgListener;

use crate::{Message, MessageStream, PubSub, PubSubError, Result};

/// Largest payload PostgreSQL accepts for `NOTIFY`, in bytes.
const MAX_NOTIFY_PAYLOAD: usize = 7999;

/// Pub/sub over PostgreSQL notifications.
///
/// Every node sharing the database sees every message. Each subscription
/// holds a dedicated connection; notifications sent while that connection
/// is down are lost.
#[derive(Clone)]
pub struct PostgresPubSub {
    node_id: NodeId,
    pool: PgPool,
}

impl PostgresPubSub {
    /// Creates a transport with a fresh node identity.
    pub fn new(pool: PgPool) -> Self {
        Self::with_node_id(pool, NodeId::new())
    }

    /// Creates a transport acting as `node_id`.
    pub fn with_node_id(pool: PgPool, node_id: NodeId) -> Self {
        Self { node_id, pool }
    }
}

#[async_trait]
impl PubSub for PostgresPubSub {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    #[tracing::instrument(skip(self, payload))]
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()> {
        let message = Message::new(topic, self.node_id, payload);
        let body = serde_json::to_string(&message)?;
        if body.len() > MAX_NOTIFY_PAYLOAD {
            return Err(PubSubError::Transport(format!(
                "message of {} bytes exceeds the notification limit",
                body.len()
            )));
        }

        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(topic)
            .bind(body)
            .execute(&self.pool)
            .await?;

        metrics::counter!("pubsub_messages_published_total").increment(1);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<MessageStream> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(topic).await?;
        tracing::debug!(topic, "listening for notifications");

        let stream = listener.into_stream().filter_map(|item| async move {
            match item {
                Ok(notification) => match serde_json::from_str::<Message>(notification.payload()) {
                    Ok(message) => Some(message),
                    Err(err) => {
                        tracing::warn!(
                            channel = notification.channel(),
                            error = %err,
                            "undecodable notification"
                        );
                        metrics::counter!("pubsub_messages_dropped_total").increment(1);
                        None
                    }
                },
                Err(err) => {
                    tracing::warn!(error = %err, "notification listener error");
                    None
                }
            }
        });
        Ok(Box::pin(stream))
    }
}
