//! Topic-based publish/subscribe fabric.
//!
//! This crate keeps nodes in step with each other:
//! - [`PubSub`] trait with an in-process and a PostgreSQL `LISTEN/NOTIFY` transport
//! - [`EventNotifier`] and [`NotifyingEventStore`] announcing new events to every node
//! - [`SnapshotCache`], a per-node cache whose writers invalidate peer copies

pub mod cache;
pub mod error;
pub mod memory;
pub mod message;
pub mod notifier;
pub mod postgres;

pub use cache::{CACHE_INVALIDATION_TOPIC, Invalidation, SnapshotCache};
pub use error::{PubSubError, Result};
pub use memory::InMemoryPubSub;
pub use message::{Message, MessageStream, PubSub, PubSubExt};
pub use notifier::{EVENTS_TOPIC, EventNotifier, NotifyingEventStore, StreamUpdated};
pub use postgres::PostgresPubSub;
