//! Query side of in-process projections.

use async_trait::async_trait;
use event_store::GlobalPosition;

use crate::consumer::EventConsumer;

/// A projection kept in process memory and queried by the node.
///
/// The state is gone when the process exits, so read models report
/// themselves as non-durable and the runtime replays them from position 0
/// whenever it starts.
#[async_trait]
pub trait ReadModel: EventConsumer {
    /// Number of entries currently held.
    async fn entries(&self) -> usize;

    /// Position of the last envelope applied to the model.
    async fn applied_position(&self) -> GlobalPosition;
}
