//! The event consumer extension point.

use async_trait::async_trait;
use event_store::{Envelope, EventFilter};

use crate::Result;

/// A consumer building a projection from the global event stream.
///
/// The projection must be a pure function of the envelopes delivered to
/// [`on`](EventConsumer::on): replaying from position 0 after
/// [`clear`](EventConsumer::clear) must converge to the same state as
/// incremental processing. Delivery is at-least-once, so `on` has to
/// tolerate an envelope it already applied.
///
/// Consumers never append events themselves.
#[async_trait]
pub trait EventConsumer: Send + Sync {
    /// Unique name; also the checkpoint key.
    fn name(&self) -> &str;

    /// Which events this consumer receives.
    fn events_filter(&self) -> EventFilter;

    /// Whether the projection outlives the process.
    ///
    /// Checkpoints of a non-durable projection are kept in memory by the
    /// runtime, so every new runtime rebuilds it from position 0 instead of
    /// resuming an empty projection from a shared checkpoint.
    fn is_durable(&self) -> bool {
        true
    }

    /// Resets the projection to its empty state.
    async fn clear(&self) -> Result<()>;

    /// Applies one envelope to the projection.
    async fn on(&self, envelope: &Envelope) -> Result<()>;
}
