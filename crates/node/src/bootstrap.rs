//! Node composition.
//!
//! Everything a node runs is wired here, explicitly: the store backend, the
//! pub/sub transport, the command pipeline and the consumer runtime. Nothing
//! registers itself.

use std::sync::Arc;

use domain::{
    AggregateRepository, AppHandler, CommandPipeline, EnrichActorHandler,
    RetryOnConflictHandler, TimingHandler,
};
use event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use projections::{
    CheckpointStore, ConsumerRuntime, ContributorsView, InMemoryCheckpointStore,
    PostgresCheckpointStore, ReadModel, SchemaIndexView,
};
use pubsub::{
    EventNotifier, InMemoryPubSub, NotifyingEventStore, PostgresPubSub, PubSub, SnapshotCache,
};
use sqlx::postgres::PgPoolOptions;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::StartupError;

/// Store handle shared by the pipeline and the consumers.
pub type SharedStore = Arc<dyn EventStore>;

/// Name of the app aggregate's snapshot cache.
pub const APP_CACHE: &str = "app";

/// A running node.
pub struct Node {
    config: Config,
    store: SharedStore,
    pubsub: Arc<dyn PubSub>,
    pipeline: Arc<CommandPipeline>,
    runtime: Arc<ConsumerRuntime<SharedStore>>,
    schemas: SchemaIndexView,
    contributors: ContributorsView,
    read_models: Vec<Arc<dyn ReadModel>>,
    listeners: Vec<JoinHandle<()>>,
}

impl Node {
    /// Connects the configured backends and starts every consumer.
    pub async fn start(config: Config) -> Result<Self, StartupError> {
        match config.database_url.clone() {
            Some(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.database_max_connections)
                    .connect(&url)
                    .await?;
                let store = PostgresEventStore::new(pool.clone());
                store.run_migrations().await?;
                tracing::info!("using PostgreSQL backends");

                Self::assemble(
                    config,
                    Arc::new(store),
                    Arc::new(PostgresPubSub::new(pool.clone())),
                    Arc::new(PostgresCheckpointStore::new(pool)),
                )
                .await
            }
            None => {
                tracing::info!("DATABASE_URL not set, running a single in-memory node");
                Self::in_memory(config).await
            }
        }
    }

    /// A node with in-memory store, pub/sub and checkpoints.
    pub async fn in_memory(config: Config) -> Result<Self, StartupError> {
        Self::assemble(
            config,
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryPubSub::new()),
            Arc::new(InMemoryCheckpointStore::new()),
        )
        .await
    }

    /// Wires a node from already constructed backends.
    ///
    /// `checkpoints` holds durable consumers only. The node's read models
    /// live in memory, so the runtime keeps their checkpoints itself and
    /// every node rebuilds them from the log when it starts.
    pub async fn assemble(
        config: Config,
        backend: SharedStore,
        pubsub: Arc<dyn PubSub>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Result<Self, StartupError> {
        let notifier = EventNotifier::new(Arc::clone(&pubsub));
        let mut listeners = vec![notifier.spawn_head_listener(Arc::clone(&backend)).await?];
        let store: SharedStore = Arc::new(NotifyingEventStore::new(backend, notifier));

        let mut repository = AggregateRepository::new(Arc::clone(&store));
        if config.snapshot_cache_capacity > 0 {
            let cache = SnapshotCache::new(
                APP_CACHE,
                config.snapshot_cache_capacity,
                Arc::clone(&pubsub),
            );
            listeners.push(cache.spawn_invalidation_listener().await?);
            repository = repository.with_cache(cache);
        }

        let pipeline = CommandPipeline::new()
            .with_handler(TimingHandler)
            .with_handler(EnrichActorHandler::new(config.default_actor.clone()))
            .with_handler(RetryOnConflictHandler::new(config.command_max_retries))
            .with_handler(AppHandler::new(repository));

        let schemas = SchemaIndexView::new();
        let contributors = ContributorsView::new();
        let mut runtime = ConsumerRuntime::new(Arc::clone(&store), checkpoints)
            .with_retry_policy(config.retry_policy());
        runtime.register(Arc::new(schemas.clone()))?;
        runtime.register(Arc::new(contributors.clone()))?;
        runtime.start_all().await;

        let read_models: Vec<Arc<dyn ReadModel>> =
            vec![Arc::new(schemas.clone()), Arc::new(contributors.clone())];

        tracing::info!(
            node_id = %pubsub.node_id(),
            handlers = pipeline.len(),
            retry_policy = ?runtime.retry_policy(),
            "node started"
        );

        Ok(Self {
            config,
            store,
            pubsub,
            pipeline: Arc::new(pipeline),
            runtime: Arc::new(runtime),
            schemas,
            contributors,
            read_models,
            listeners,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The store as seen by writers: appends are announced to peers.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn pubsub(&self) -> &Arc<dyn PubSub> {
        &self.pubsub
    }

    pub fn pipeline(&self) -> &Arc<CommandPipeline> {
        &self.pipeline
    }

    pub fn runtime(&self) -> &Arc<ConsumerRuntime<SharedStore>> {
        &self.runtime
    }

    pub fn schemas(&self) -> &SchemaIndexView {
        &self.schemas
    }

    pub fn contributors(&self) -> &ContributorsView {
        &self.contributors
    }

    /// Looks up the read model fed by consumer `name`.
    pub fn read_model(&self, name: &str) -> Option<&Arc<dyn ReadModel>> {
        self.read_models.iter().find(|model| model.name() == name)
    }

    /// Stops consumers and background listeners.
    pub async fn shutdown(&self) {
        self.runtime.shutdown().await;
        for listener in &self.listeners {
            listener.abort();
        }
        tracing::info!("node stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use domain::Command;
    use event_store::{StreamId, Version};
    use projections::{ConsumerStatus, SCHEMA_INDEX_CONSUMER};

    use super::*;

    #[tokio::test]
    async fn in_memory_node_runs_commands_into_views() {
        let node = Node::in_memory(Config::default()).await.unwrap();
        let app = StreamId::from("app-42");

        node.pipeline()
            .handle(Command::new("CreateApp", app.clone(), serde_json::json!({})))
            .await
            .unwrap();
        let result = node
            .pipeline()
            .handle(Command::new(
                "CreateSchema",
                app.clone(),
                serde_json::json!({"schema": "posts"}),
            ))
            .await
            .unwrap();
        assert_eq!(result.version, Version::new(3));

        let mut progress = node.runtime().progress(SCHEMA_INDEX_CONSUMER).unwrap();
        let target = result.last_position.unwrap();
        tokio::time::timeout(
            Duration::from_secs(5),
            progress.wait_for(|p| p.status == ConsumerStatus::Live && p.position >= target),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(node.schemas().schemas_for(&app).await.len(), 1);
        let owners = node.contributors().contributors_of(&app).await;
        assert_eq!(owners[0].contributor, "system");
        node.shutdown().await;
    }

    #[tokio::test]
    async fn two_nodes_share_one_store() {
        let backend: SharedStore = Arc::new(InMemoryEventStore::new());
        let bus = InMemoryPubSub::new();
        let checkpoints = || Arc::new(InMemoryCheckpointStore::new()) as Arc<dyn CheckpointStore>;

        let a = Node::assemble(
            Config::default(),
            Arc::clone(&backend),
            Arc::new(bus.clone()),
            checkpoints(),
        )
        .await
        .unwrap();
        let b = Node::assemble(
            Config::default(),
            Arc::clone(&backend),
            Arc::new(bus.peer()),
            checkpoints(),
        )
        .await
        .unwrap();

        let app = StreamId::from("app-7");
        a.pipeline()
            .handle(Command::new("CreateApp", app.clone(), serde_json::json!({})))
            .await
            .unwrap();
        b.pipeline()
            .handle(Command::new(
                "CreateSchema",
                app.clone(),
                serde_json::json!({"schema": "pages"}),
            ))
            .await
            .unwrap();

        let head = backend.head_position().await.unwrap();
        for node in [&a, &b] {
            let mut progress = node.runtime().progress(SCHEMA_INDEX_CONSUMER).unwrap();
            tokio::time::timeout(
                Duration::from_secs(5),
                progress.wait_for(|p| p.status == ConsumerStatus::Live && p.position >= head),
            )
            .await
            .unwrap()
            .unwrap();
            assert_eq!(node.schemas().schemas_for(&app).await.len(), 1);
        }

        a.shutdown().await;
        b.shutdown().await;
    }
}
