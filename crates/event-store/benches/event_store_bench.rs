use criterion::{Criterion, criterion_group, criterion_main};
use event_store::{
    EventData, EventFilter, EventStore, EventStoreExt, GlobalPosition, InMemoryEventStore,
    StreamId, SubscriptionMessage, Version,
};

fn make_event(n: usize) -> EventData {
    EventData::new(
        "SchemaCreated",
        serde_json::json!({
            "schema": format!("schema-{n}"),
            "fields": ["title", "body"]
        }),
    )
}

fn bench_append_single_event(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/append_single_event", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                store
                    .append(&StreamId::from("app-1"), Version::initial(), vec![make_event(0)])
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_append_batch_10(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/append_batch_10", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                let events: Vec<EventData> = (0..10).map(make_event).collect();
                store
                    .append(&StreamId::from("app-1"), Version::initial(), events)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_read_stream_tail(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let stream = StreamId::from("app-1");

    // Pre-populate with 100 events
    rt.block_on(async {
        let events: Vec<EventData> = (0..100).map(make_event).collect();
        store
            .append(&stream, Version::initial(), events)
            .await
            .unwrap();
    });

    c.bench_function("event_store/read_stream_from_version_50", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.read_stream(&stream, Version::new(50)).await.unwrap();
            });
        });
    });
}

fn bench_read_all_1000(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();

    // Pre-populate with 1000 events across 10 streams
    rt.block_on(async {
        for s in 0..10 {
            let events: Vec<EventData> = (0..100).map(make_event).collect();
            store
                .append(&StreamId::for_aggregate("app", s), Version::initial(), events)
                .await
                .unwrap();
        }
    });

    c.bench_function("event_store/read_all_1000_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let events = store.read_all_events(GlobalPosition::START).await.unwrap();
                assert_eq!(events.len(), 1000);
            });
        });
    });
}

fn bench_subscription_catch_up(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();

    rt.block_on(async {
        for s in 0..10 {
            let events: Vec<EventData> = (0..100).map(make_event).collect();
            store
                .append(&StreamId::for_aggregate("app", s), Version::initial(), events)
                .await
                .unwrap();
        }
    });

    c.bench_function("event_store/subscription_catch_up_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut subscription = store.subscribe(GlobalPosition::START, EventFilter::all());
                let mut count = 0;
                while let Some(message) = subscription.next_message().await {
                    match message.unwrap() {
                        SubscriptionMessage::Event(_) => count += 1,
                        SubscriptionMessage::CaughtUp { .. } => break,
                    }
                }
                assert_eq!(count, 1000);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_append_single_event,
    bench_append_batch_10,
    bench_read_stream_tail,
    bench_read_all_1000,
    bench_subscription_catch_up,
);
criterion_main!(benches);
