//! Identifiers shared by every crate of the event pipeline.

mod types;

pub use types::{CommitId, NodeId, StreamId};
