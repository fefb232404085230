//! Event consumers for the query side.
//!
//! This crate hosts everything that reads the global event stream:
//! - [`EventConsumer`] trait for building projections from envelopes
//! - [`ConsumerRuntime`] running every consumer in its own task
//! - [`CheckpointStore`] persisting position and health per consumer
//! - [`ReadModel`] views: schema index and app contributors

pub mod checkpoint;
pub mod consumer;
pub mod error;
pub mod read_model;
pub mod runtime;
pub mod state;
pub mod views;

pub use checkpoint::{CheckpointStore, InMemoryCheckpointStore, PostgresCheckpointStore};
pub use consumer::EventConsumer;
pub use error::{ConsumerError, Result};
pub use read_model::ReadModel;
pub use runtime::{ConsumerRuntime, RetryPolicy};
pub use state::{ConsumerHealth, ConsumerProgress, ConsumerState, ConsumerStatus};
pub use views::{Contributor, ContributorsView, SchemaEntry, SchemaIndexView};
pub use views::contributors::CONTRIBUTORS_CONSUMER;
pub use views::schema_index::SCHEMA_INDEX_CONSUMER;
