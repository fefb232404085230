//! Append-only event store with per-stream optimistic concurrency, a global
//! total order, and catch-up subscriptions.

pub mod error;
pub mod event;
pub mod filter;
pub mod memory;
pub mod postgres;
pub mod snapshot;
pub mod store;
pub mod subscription;

pub use common::{CommitId, StreamId};
pub use error::{EventStoreError, Result};
pub use event::{Envelope, Event, EventData, EventId, GlobalPosition, Version};
pub use filter::EventFilter;
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use snapshot::Snapshot;
pub use store::{AppendResult, EventStore, EventStoreExt};
pub use subscription::{EventSubscription, SubscriptionMessage, SubscriptionOptions};
