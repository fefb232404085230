//! Integration tests: command pipeline → event store → consumer runtime → views.

use std::sync::Arc;
use std::time::Duration;

use domain::{AggregateRepository, AppHandler, Command, CommandPipeline, EnrichActorHandler};
use event_store::{
    EventData, EventStore, EventStoreError, GlobalPosition, InMemoryEventStore, StreamId, Version,
};
use projections::{
    CONTRIBUTORS_CONSUMER, ConsumerProgress, ConsumerRuntime, ConsumerStatus, ContributorsView,
    InMemoryCheckpointStore, ReadModel, SCHEMA_INDEX_CONSUMER, SchemaIndexView,
};

struct Setup {
    store: InMemoryEventStore,
    pipeline: CommandPipeline,
    runtime: ConsumerRuntime<InMemoryEventStore>,
    schemas: SchemaIndexView,
    contributors: ContributorsView,
}

fn setup() -> Setup {
    let store = InMemoryEventStore::new();
    let pipeline = CommandPipeline::new()
        .with_handler(EnrichActorHandler::new("system"))
        .with_handler(AppHandler::new(AggregateRepository::new(store.clone())));

    let schemas = SchemaIndexView::new();
    let contributors = ContributorsView::new();

    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let mut runtime = ConsumerRuntime::new(store.clone(), checkpoints);
    runtime.register(Arc::new(schemas.clone())).unwrap();
    runtime.register(Arc::new(contributors.clone())).unwrap();

    Setup {
        store,
        pipeline,
        runtime,
        schemas,
        contributors,
    }
}

fn command(app: &str, kind: &str, payload: serde_json::Value) -> Command {
    Command::new(kind, StreamId::for_aggregate("app", app), payload).with_actor("alice")
}

async fn wait_live_at(
    runtime: &ConsumerRuntime<InMemoryEventStore>,
    name: &str,
    position: GlobalPosition,
) {
    let mut progress = runtime.progress(name).unwrap();
    tokio::time::timeout(
        Duration::from_secs(5),
        progress.wait_for(|p: &ConsumerProgress| {
            p.status == ConsumerStatus::Live && p.position >= position
        }),
    )
    .await
    .expect("timed out waiting for consumer")
    .unwrap();
}

async fn wait_all(setup: &Setup) {
    let head = setup.store.head_position().await.unwrap();
    wait_live_at(&setup.runtime, SCHEMA_INDEX_CONSUMER, head).await;
    wait_live_at(&setup.runtime, CONTRIBUTORS_CONSUMER, head).await;
}

#[tokio::test]
async fn schema_index_follows_commands_end_to_end() {
    let setup = setup();
    let app = StreamId::from("app-42");

    setup
        .pipeline
        .handle(command("42", "CreateApp", serde_json::json!({})))
        .await
        .unwrap();
    setup.runtime.start_all().await;
    wait_all(&setup).await;

    let result = setup
        .pipeline
        .handle(command(
            "42",
            "CreateSchema",
            serde_json::json!({"schema": "posts", "fields": ["title"]}),
        ))
        .await
        .unwrap();
    assert_eq!(result.version, Version::new(3));
    let position = result.last_position.unwrap();

    wait_live_at(&setup.runtime, SCHEMA_INDEX_CONSUMER, position).await;
    let schemas = setup.schemas.schemas_for(&app).await;
    assert_eq!(schemas.len(), 1);
    assert_eq!(schemas[0].schema, "posts");
    assert!(!schemas[0].published);

    let states = setup.runtime.states().await.unwrap();
    let state = states
        .iter()
        .find(|s| s.name == SCHEMA_INDEX_CONSUMER)
        .unwrap();
    assert_eq!(state.position, position);
    assert_eq!(setup.schemas.applied_position().await, position);

    // A stale writer is refused and the stream stays where it was
    let stale = setup
        .store
        .append(
            &app,
            Version::initial(),
            vec![EventData::new("SchemaCreated", serde_json::json!({}))],
        )
        .await;
    assert!(matches!(
        stale,
        Err(EventStoreError::ConcurrencyConflict { .. })
    ));
    assert_eq!(setup.store.stream_version(&app).await.unwrap(), Version::new(3));

    let roles = setup.contributors.contributors_of(&app).await;
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].contributor, "alice");
    assert_eq!(roles[0].role, "owner");
}

#[tokio::test]
async fn rebuild_matches_incremental_processing() {
    let setup = setup();
    setup.runtime.start_all().await;

    for app in ["1", "2"] {
        setup
            .pipeline
            .handle(command(app, "CreateApp", serde_json::json!({})))
            .await
            .unwrap();
        setup
            .pipeline
            .handle(command(app, "CreateSchema", serde_json::json!({"schema": "posts"})))
            .await
            .unwrap();
    }
    setup
        .pipeline
        .handle(command("1", "PublishSchema", serde_json::json!({"schema": "posts"})))
        .await
        .unwrap();
    setup
        .pipeline
        .handle(command(
            "2",
            "AssignContributor",
            serde_json::json!({"contributor": "bob", "role": "editor"}),
        ))
        .await
        .unwrap();
    setup
        .pipeline
        .handle(command("2", "DeleteSchema", serde_json::json!({"schema": "posts"})))
        .await
        .unwrap();
    wait_all(&setup).await;

    let app1 = StreamId::from("app-1");
    let app2 = StreamId::from("app-2");
    let schemas_before = (
        setup.schemas.schemas_for(&app1).await,
        setup.schemas.schemas_for(&app2).await,
    );
    let contributors_before = setup.contributors.contributors_of(&app2).await;
    assert_eq!(schemas_before.0.len(), 1);
    assert!(schemas_before.0[0].published);
    assert!(schemas_before.1.is_empty());
    assert_eq!(contributors_before.len(), 2);

    setup.runtime.rebuild(SCHEMA_INDEX_CONSUMER).await.unwrap();
    setup.runtime.rebuild(CONTRIBUTORS_CONSUMER).await.unwrap();
    wait_all(&setup).await;

    assert_eq!(setup.schemas.schemas_for(&app1).await, schemas_before.0);
    assert_eq!(setup.schemas.schemas_for(&app2).await, schemas_before.1);
    assert_eq!(
        setup.contributors.contributors_of(&app2).await,
        contributors_before
    );
}

#[tokio::test]
async fn fresh_views_converge_to_live_views() {
    let setup = setup();
    setup.runtime.start_all().await;

    setup
        .pipeline
        .handle(command("9", "CreateApp", serde_json::json!({})))
        .await
        .unwrap();
    for schema in ["a", "b", "c"] {
        setup
            .pipeline
            .handle(command("9", "CreateSchema", serde_json::json!({"schema": schema})))
            .await
            .unwrap();
    }
    wait_all(&setup).await;

    // A second node replays the same store from scratch
    let replayed = SchemaIndexView::new();
    let mut runtime = ConsumerRuntime::new(
        setup.store.clone(),
        Arc::new(InMemoryCheckpointStore::new()),
    );
    runtime.register(Arc::new(replayed.clone())).unwrap();
    runtime.start_all().await;
    let head = setup.store.head_position().await.unwrap();
    wait_live_at(&runtime, SCHEMA_INDEX_CONSUMER, head).await;

    let app = StreamId::from("app-9");
    assert_eq!(
        replayed.schemas_for(&app).await,
        setup.schemas.schemas_for(&app).await
    );
    assert_eq!(replayed.entries().await, 3);
    runtime.shutdown().await;
}
