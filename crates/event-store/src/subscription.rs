//! Catch-up subscriptions shared by all store backends.
//!
//! A subscription reads history in batches through [`EventStore::read_all`],
//! reports when it reached the head, then waits for the store's head position
//! to move (with a polling fallback) and keeps reading. Every backend only has
//! to publish its head position on a `watch` channel.
//!
//! Positions are allocated before commit, so a backend may expose a higher
//! position while a lower one is still in flight. The reader never moves past
//! such a gap until it has stayed open for [`SubscriptionOptions::gap_timeout`];
//! gaps left by rolled-back appends are skipped after that.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::time::Instant;

use futures_core::Stream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::{Envelope, EventFilter, EventStore, GlobalPosition, Result};

/// Item delivered by an [`EventSubscription`].
#[derive(Debug, Clone)]
pub enum SubscriptionMessage {
    /// An event passing the subscription's filter.
    Event(Envelope),

    /// History has been delivered; every event up to `position` was examined.
    /// Sent once, before the first live event.
    CaughtUp { position: GlobalPosition },
}

/// Tuning knobs for subscriptions.
#[derive(Debug, Clone)]
pub struct SubscriptionOptions {
    /// Events fetched per read.
    pub batch_size: usize,

    /// Envelopes buffered between the reader task and the subscriber.
    pub buffer: usize,

    /// Upper bound on how long a live subscription waits before re-reading.
    pub poll_interval: Duration,

    /// Delay before re-reading when the head moved but events are not yet visible.
    pub retry_delay: Duration,

    /// How long a missing position may hold the reader back before it is
    /// treated as a rolled-back append and skipped.
    pub gap_timeout: Duration,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            batch_size: 256,
            buffer: 128,
            poll_interval: Duration::from_secs(1),
            retry_delay: Duration::from_millis(10),
            gap_timeout: Duration::from_secs(3),
        }
    }
}

/// A live, filtered stream of envelopes.
///
/// Dropping the subscription aborts its reader task.
pub struct EventSubscription {
    receiver: mpsc::Receiver<Result<SubscriptionMessage>>,
    task: JoinHandle<()>,
}

impl EventSubscription {
    /// Starts a subscription reading `store` from `from` (inclusive).
    pub fn spawn<S>(
        store: S,
        from: GlobalPosition,
        filter: EventFilter,
        head: watch::Receiver<GlobalPosition>,
        options: SubscriptionOptions,
    ) -> Self
    where
        S: EventStore + 'static,
    {
        let (tx, receiver) = mpsc::channel(options.buffer.max(1));
        let task = tokio::spawn(run(store, from, filter, head, options, tx));
        Self { receiver, task }
    }

    /// Receives the next message, or `None` once the subscription ended.
    pub async fn next_message(&mut self) -> Option<Result<SubscriptionMessage>> {
        self.receiver.recv().await
    }
}

impl Stream for EventSubscription {
    type Item = Result<SubscriptionMessage>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[tracing::instrument(skip(store, filter, head, options, tx), fields(filter = %filter))]
async fn run<S: EventStore>(
    store: S,
    from: GlobalPosition,
    filter: EventFilter,
    mut head: watch::Receiver<GlobalPosition>,
    options: SubscriptionOptions,
    tx: mpsc::Sender<Result<SubscriptionMessage>>,
) {
    let mut next = from.max(GlobalPosition::START.next());
    let mut scanned = GlobalPosition::new(next.as_i64() - 1);
    let mut live = false;
    let mut head_open = true;
    // First missing position and when it was first seen
    let mut gap: Option<(GlobalPosition, Instant)> = None;

    loop {
        let batch = match store.read_all(next, options.batch_size).await {
            Ok(batch) => batch,
            Err(err) => {
                tracing::warn!(error = %err, %next, "subscription read failed");
                let _ = tx.send(Err(err)).await;
                return;
            }
        };

        if batch.is_empty() {
            if !live {
                live = true;
                tracing::debug!(position = %scanned, "subscription caught up");
                let caught_up = SubscriptionMessage::CaughtUp { position: scanned };
                if tx.send(Ok(caught_up)).await.is_err() {
                    return;
                }
            }

            let observed = *head.borrow_and_update();
            let wait = if observed >= next {
                options.retry_delay
            } else {
                options.poll_interval
            };

            if observed < next && head_open {
                tokio::select! {
                    changed = head.changed() => {
                        if changed.is_err() {
                            head_open = false;
                        }
                    }
                    _ = tokio::time::sleep(wait) => {}
                    _ = tx.closed() => return,
                }
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = tx.closed() => return,
                }
            }
            continue;
        }

        let mut stalled = false;
        for event in batch {
            if event.position > next {
                let since = match gap {
                    Some((position, since)) if position == next => since,
                    _ => {
                        let since = Instant::now();
                        gap = Some((next, since));
                        since
                    }
                };
                if since.elapsed() < options.gap_timeout {
                    stalled = true;
                    break;
                }
                tracing::warn!(
                    from = %next,
                    to = %event.position,
                    "skipping positions that never became visible"
                );
                metrics::counter!("subscription_gaps_skipped_total").increment(1);
            }

            next = event.position.next();
            scanned = event.position;
            if !filter.matches(&event) {
                continue;
            }
            let envelope = Envelope::new(event, !live);
            if tx
                .send(Ok(SubscriptionMessage::Event(envelope)))
                .await
                .is_err()
            {
                return;
            }
        }

        if stalled {
            tracing::debug!(%next, "waiting for an earlier position to commit");
            tokio::select! {
                _ = tokio::time::sleep(options.retry_delay) => {}
                _ = tx.closed() => return,
            }
        }
    }
}
