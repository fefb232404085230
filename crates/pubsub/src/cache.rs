//! Per-node snapshot cache kept coherent across nodes.
//!
//! Each node caches aggregate snapshots locally. A node that stores a newer
//! snapshot publishes an [`Invalidation`] so peers drop their stale copy.
//! Invalidations are best-effort; readers must treat a cached snapshot as a
//! starting point and read the stream tail after its version.

use std::num::NonZeroUsize;
use std::sync::Arc;

use event_store::{Snapshot, StreamId};
use futures_util::StreamExt;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::{PubSub, PubSubExt, Result};

/// Topic carrying [`Invalidation`] messages.
pub const CACHE_INVALIDATION_TOPIC: &str = "cache.invalidate";

/// Request to drop one key from a named cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invalidation {
    pub cache: String,
    pub key: StreamId,
}

/// LRU cache of snapshots keyed by stream.
#[derive(Clone)]
pub struct SnapshotCache {
    name: String,
    entries: Arc<Mutex<LruCache<StreamId, Snapshot>>>,
    pubsub: Arc<dyn PubSub>,
}

impl SnapshotCache {
    /// Creates a cache holding up to `capacity` snapshots (at least one).
    pub fn new(name: impl Into<String>, capacity: usize, pubsub: Arc<dyn PubSub>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name: name.into(),
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
            pubsub,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the cached snapshot for `key`, if any.
    pub async fn get(&self, key: &StreamId) -> Option<Snapshot> {
        let found = self.entries.lock().await.get(key).cloned();
        if found.is_some() {
            metrics::counter!("snapshot_cache_hits_total", "cache" => self.name.clone())
                .increment(1);
        } else {
            metrics::counter!("snapshot_cache_misses_total", "cache" => self.name.clone())
                .increment(1);
        }
        found
    }

    /// Stores a snapshot locally unless a newer one is already cached.
    pub async fn put(&self, snapshot: Snapshot) {
        let mut entries = self.entries.lock().await;
        if let Some(existing) = entries.peek(&snapshot.stream_id)
            && existing.version >= snapshot.version
        {
            return;
        }
        entries.put(snapshot.stream_id.clone(), snapshot);
    }

    /// Stores a snapshot and tells peers to drop their copy of the key.
    pub async fn publish_update(&self, snapshot: Snapshot) -> Result<()> {
        let key = snapshot.stream_id.clone();
        self.put(snapshot).await;
        self.announce(key).await
    }

    /// Drops `key` locally without telling peers.
    pub async fn evict(&self, key: &StreamId) -> bool {
        self.entries.lock().await.pop(key).is_some()
    }

    /// Drops `key` on this node and every peer.
    pub async fn invalidate(&self, key: &StreamId) -> Result<()> {
        self.evict(key).await;
        self.announce(key.clone()).await
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn announce(&self, key: StreamId) -> Result<()> {
        let invalidation = Invalidation {
            cache: self.name.clone(),
            key,
        };
        self.pubsub
            .publish_json(CACHE_INVALIDATION_TOPIC, &invalidation)
            .await
    }

    /// Evicts keys named by invalidations from other nodes.
    pub async fn spawn_invalidation_listener(&self) -> Result<JoinHandle<()>> {
        let mut messages = self.pubsub.subscribe(CACHE_INVALIDATION_TOPIC).await?;
        let own = self.pubsub.node_id();
        let cache = self.clone();

        Ok(tokio::spawn(async move {
            while let Some(message) = messages.next().await {
                if message.origin == own {
                    continue;
                }
                match message.decode::<Invalidation>() {
                    Ok(invalidation) if invalidation.cache == cache.name => {
                        if cache.evict(&invalidation.key).await {
                            tracing::debug!(
                                cache = %cache.name,
                                key = %invalidation.key,
                                "evicted by peer"
                            );
                        }
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "malformed invalidation"),
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use event_store::Version;

    use super::*;
    use crate::InMemoryPubSub;

    fn snapshot(key: &str, version: i64) -> Snapshot {
        Snapshot::new(
            StreamId::from(key),
            "App",
            Version::new(version),
            serde_json::json!({"version": version}),
        )
    }

    async fn eventually<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn put_keeps_newest_version() {
        let cache = SnapshotCache::new("apps", 8, Arc::new(InMemoryPubSub::new()));
        cache.put(snapshot("app-1", 3)).await;
        cache.put(snapshot("app-1", 2)).await;

        let cached = cache.get(&StreamId::from("app-1")).await.unwrap();
        assert_eq!(cached.version, Version::new(3));

        cache.put(snapshot("app-1", 5)).await;
        let cached = cache.get(&StreamId::from("app-1")).await.unwrap();
        assert_eq!(cached.version, Version::new(5));
    }

    #[tokio::test]
    async fn least_recently_used_entry_is_dropped() {
        let cache = SnapshotCache::new("apps", 2, Arc::new(InMemoryPubSub::new()));
        cache.put(snapshot("app-1", 1)).await;
        cache.put(snapshot("app-2", 1)).await;
        cache.get(&StreamId::from("app-1")).await;
        cache.put(snapshot("app-3", 1)).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get(&StreamId::from("app-2")).await.is_none());
        assert!(cache.get(&StreamId::from("app-1")).await.is_some());
    }

    #[tokio::test]
    async fn update_on_one_node_evicts_peer_copy() {
        let bus = InMemoryPubSub::new();
        let node_a = SnapshotCache::new("apps", 8, Arc::new(bus.clone()));
        let node_b = SnapshotCache::new("apps", 8, Arc::new(bus.peer()));
        let listener_a = node_a.spawn_invalidation_listener().await.unwrap();
        let listener_b = node_b.spawn_invalidation_listener().await.unwrap();

        node_b.put(snapshot("app-1", 1)).await;
        node_a.publish_update(snapshot("app-1", 2)).await.unwrap();

        eventually(|| async { node_b.is_empty().await }).await;
        // The publisher keeps its own fresh copy
        let kept = node_a.get(&StreamId::from("app-1")).await.unwrap();
        assert_eq!(kept.version, Version::new(2));

        listener_a.abort();
        listener_b.abort();
    }

    #[tokio::test]
    async fn invalidations_for_other_caches_are_ignored() {
        let bus = InMemoryPubSub::new();
        let apps = SnapshotCache::new("apps", 8, Arc::new(bus.clone()));
        let other = SnapshotCache::new("schemas", 8, Arc::new(bus.peer()));
        let listener = apps.spawn_invalidation_listener().await.unwrap();

        apps.put(snapshot("app-1", 1)).await;
        other.invalidate(&StreamId::from("app-1")).await.unwrap();
        // Follow up with a matching invalidation for another key to know the
        // first one was processed
        let peer = SnapshotCache::new("apps", 8, Arc::new(bus.peer()));
        apps.put(snapshot("app-2", 1)).await;
        peer.invalidate(&StreamId::from("app-2")).await.unwrap();

        eventually(|| async { apps.len().await == 1 }).await;
        assert!(apps.get(&StreamId::from("app-1")).await.is_some());

        listener.abort();
    }
}
