use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    AggregateRepository, App, AppEvent, AppHandler, Command, CommandPipeline, DomainEvent,
    EnrichActorHandler, TimingHandler,
};
use event_store::{EventData, EventStore, InMemoryEventStore, StreamId, Version};
use pubsub::{InMemoryPubSub, SnapshotCache};

fn pipeline(repository: AggregateRepository<InMemoryEventStore, App>) -> CommandPipeline {
    CommandPipeline::new()
        .with_handler(TimingHandler)
        .with_handler(EnrichActorHandler::new("bench"))
        .with_handler(AppHandler::new(repository))
}

fn command(stream: &StreamId, kind: &str, payload: serde_json::Value) -> Command {
    Command::new(kind, stream.clone(), payload)
}

/// Stores an app with `schemas` schemas directly in the event store.
fn populate(rt: &tokio::runtime::Runtime, store: &InMemoryEventStore, schemas: usize) -> StreamId {
    let stream = StreamId::from("app-bench");
    let mut events = vec![AppEvent::AppCreated {
        name: "bench".to_string(),
        created_by: None,
    }];
    events.extend((0..schemas).map(|n| AppEvent::SchemaCreated {
        schema: format!("schema-{n}"),
        fields: vec!["title".to_string()],
    }));
    let data: Vec<EventData> = events
        .iter()
        .map(|e| EventData::from_payload(e.event_type(), e).unwrap())
        .collect();

    rt.block_on(async {
        store
            .append(&stream, Version::initial(), data)
            .await
            .unwrap();
    });
    stream
}

fn bench_create_app(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("domain/create_app", |b| {
        b.iter(|| {
            rt.block_on(async {
                let pipeline = pipeline(AggregateRepository::new(InMemoryEventStore::new()));
                let stream = StreamId::from("app-bench");
                pipeline
                    .handle(command(&stream, "CreateApp", serde_json::json!({})))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_assign_contributor(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let stream = populate(&rt, &store, 0);
    let pipeline = pipeline(AggregateRepository::new(store));
    let mut n = 0u64;

    c.bench_function("domain/assign_contributor", |b| {
        b.iter(|| {
            n += 1;
            rt.block_on(async {
                pipeline
                    .handle(command(
                        &stream,
                        "AssignContributor",
                        serde_json::json!({"contributor": format!("user-{n}")}),
                    ))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_load_100_events(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let stream = populate(&rt, &store, 99);
    let repository: AggregateRepository<_, App> = AggregateRepository::new(store);

    c.bench_function("domain/load_100_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let loaded = repository.load(&stream).await.unwrap();
                assert_eq!(loaded.version, Version::new(100));
            });
        });
    });
}

fn bench_load_100_events_cached(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let stream = populate(&rt, &store, 98);
    let cache = SnapshotCache::new("aggregates", 16, Arc::new(InMemoryPubSub::new()));
    let repository: AggregateRepository<_, App> =
        AggregateRepository::new(store).with_cache(cache);

    // Writing the 100th event through the repository fills the cache
    rt.block_on(async {
        let loaded = repository.load(&stream).await.unwrap();
        let event = AppEvent::SchemaCreated {
            schema: "last".to_string(),
            fields: vec![],
        };
        repository
            .save(loaded, vec![event], &Default::default())
            .await
            .unwrap();
    });

    c.bench_function("domain/load_100_events_cached", |b| {
        b.iter(|| {
            rt.block_on(async {
                let loaded = repository.load(&stream).await.unwrap();
                assert_eq!(loaded.version, Version::new(100));
            });
        });
    });
}

criterion_group!(
    benches,
    bench_create_app,
    bench_assign_contributor,
    bench_load_100_events,
    bench_load_100_events_cached,
);
criterion_main!(benches);
