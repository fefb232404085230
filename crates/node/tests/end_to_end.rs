//! The full propagation path on one node: append, notification, consumer
//! resuming from its checkpoint, and conflict on a stale writer.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use domain::{AppEvent, DomainEvent};
use event_store::{
    Envelope, EventData, EventFilter, EventStore, EventStoreError, GlobalPosition,
    InMemoryEventStore, StreamId, Version,
};
use futures_util::StreamExt;
use projections::{
    CheckpointStore, ConsumerRuntime, ConsumerState, ConsumerStatus, EventConsumer,
    InMemoryCheckpointStore, SCHEMA_INDEX_CONSUMER, SchemaIndexView,
};
use pubsub::{
    EVENTS_TOPIC, EventNotifier, InMemoryPubSub, NotifyingEventStore, PubSub, StreamUpdated,
};

/// Schema index whose projection is persisted elsewhere, so it resumes from
/// its stored checkpoint instead of replaying.
struct StoredSchemaIndex {
    view: SchemaIndexView,
    applied: Mutex<Vec<GlobalPosition>>,
}

#[async_trait]
impl EventConsumer for StoredSchemaIndex {
    fn name(&self) -> &str {
        self.view.name()
    }

    fn events_filter(&self) -> EventFilter {
        self.view.events_filter()
    }

    async fn clear(&self) -> projections::Result<()> {
        self.applied.lock().unwrap().clear();
        self.view.clear().await
    }

    async fn on(&self, envelope: &Envelope) -> projections::Result<()> {
        self.applied.lock().unwrap().push(envelope.position());
        self.view.on(envelope).await
    }
}

#[tokio::test]
async fn schema_created_reaches_schema_index_from_checkpoint_99() {
    let backend = InMemoryEventStore::new();
    let noise: Vec<_> = (0..99)
        .map(|i| EventData::new("MetricsSampled", serde_json::json!({ "n": i })))
        .collect();
    backend
        .append(&StreamId::from("metrics-1"), Version::initial(), noise)
        .await
        .unwrap();

    let checkpoints = InMemoryCheckpointStore::new();
    let mut state = ConsumerState::new(SCHEMA_INDEX_CONSUMER);
    state.advance(GlobalPosition::new(99));
    checkpoints.save(&state).await.unwrap();

    let pubsub = InMemoryPubSub::new();
    let mut updates = pubsub.subscribe(EVENTS_TOPIC).await.unwrap();
    let store = NotifyingEventStore::new(backend, EventNotifier::new(Arc::new(pubsub.clone())));

    let view = SchemaIndexView::new();
    let consumer = Arc::new(StoredSchemaIndex {
        view: view.clone(),
        applied: Mutex::new(Vec::new()),
    });
    let mut runtime = ConsumerRuntime::new(store.clone(), Arc::new(checkpoints.clone()));
    runtime.register(consumer.clone()).unwrap();
    runtime.start_all().await;

    let app = StreamId::from("app-42");
    let created = AppEvent::SchemaCreated {
        schema: "posts".to_string(),
        fields: vec!["title".to_string()],
    };
    let result = store
        .append(
            &app,
            Version::initial(),
            vec![EventData::from_payload(created.event_type(), &created).unwrap()],
        )
        .await
        .unwrap();
    assert_eq!(result.version, Version::new(1));
    assert_eq!(result.last_position, GlobalPosition::new(100));

    let message = tokio::time::timeout(Duration::from_secs(5), updates.next())
        .await
        .unwrap()
        .unwrap();
    let update: StreamUpdated = message.decode().unwrap();
    assert_eq!(update.stream_id, app);
    assert_eq!(update.version, Version::new(1));
    assert_eq!(update.position, GlobalPosition::new(100));

    let mut progress = runtime.progress(SCHEMA_INDEX_CONSUMER).unwrap();
    tokio::time::timeout(
        Duration::from_secs(5),
        progress.wait_for(|p| {
            p.status == ConsumerStatus::Live && p.position == GlobalPosition::new(100)
        }),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(view.get(&app, "posts").await.is_some());
    // Resumed strictly after 99, without clearing
    assert_eq!(
        *consumer.applied.lock().unwrap(),
        vec![GlobalPosition::new(100)]
    );
    let state = checkpoints.load(SCHEMA_INDEX_CONSUMER).await.unwrap().unwrap();
    assert_eq!(state.position, GlobalPosition::new(100));

    let stale = store
        .append(
            &app,
            Version::initial(),
            vec![EventData::from_payload(created.event_type(), &created).unwrap()],
        )
        .await;
    assert!(matches!(
        stale,
        Err(EventStoreError::ConcurrencyConflict { .. })
    ));
    assert_eq!(store.stream_version(&app).await.unwrap(), Version::new(1));

    runtime.shutdown().await;
}
