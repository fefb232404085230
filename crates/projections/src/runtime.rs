//! Hosting event consumers.
//!
//! Every registered consumer runs in its own task with its own store
//! subscription, so a slow or failing consumer never holds up appends or
//! other consumers. The checkpoint is saved after each applied envelope.
//!
//! Durable consumers keep their checkpoints in the configured
//! [`CheckpointStore`]. Non-durable ones get an in-memory store owned by the
//! runtime, so the checkpoint never outlives the projection it describes.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use event_store::{EventStore, GlobalPosition, SubscriptionMessage};
use futures_util::FutureExt;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::checkpoint::{CheckpointStore, InMemoryCheckpointStore};
use crate::consumer::EventConsumer;
use crate::state::{ConsumerProgress, ConsumerState, ConsumerStatus};
use crate::{ConsumerError, Result};

/// What happens to a consumer after it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Stay failed until [`ConsumerRuntime::retry`] is called.
    #[default]
    Manual,

    /// Retry automatically after the given delay.
    Interval(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartMode {
    /// Continue from the checkpoint; stay failed if the consumer failed before.
    Resume,
    /// Clear a recorded failure and continue from the checkpoint.
    Retry,
    /// Clear the projection and replay from the beginning.
    Rebuild,
}

struct Slot {
    consumer: Arc<dyn EventConsumer>,
    checkpoints: Arc<dyn CheckpointStore>,
    progress: Arc<watch::Sender<ConsumerProgress>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Runs a set of consumers against one event store.
pub struct ConsumerRuntime<S> {
    store: S,
    checkpoints: Arc<dyn CheckpointStore>,
    volatile: Arc<dyn CheckpointStore>,
    slots: BTreeMap<String, Slot>,
    retry_policy: RetryPolicy,
}

impl<S> ConsumerRuntime<S>
where
    S: EventStore + Clone + 'static,
{
    pub fn new(store: S, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self {
            store,
            checkpoints,
            volatile: Arc::new(InMemoryCheckpointStore::new()),
            slots: BTreeMap::new(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    /// Adds a consumer. Names must be unique.
    pub fn register(&mut self, consumer: Arc<dyn EventConsumer>) -> Result<()> {
        let name = consumer.name().to_string();
        if self.slots.contains_key(&name) {
            return Err(ConsumerError::DuplicateConsumer(name));
        }

        let checkpoints = if consumer.is_durable() {
            Arc::clone(&self.checkpoints)
        } else {
            Arc::clone(&self.volatile)
        };
        let (progress, _) = watch::channel(ConsumerProgress::default());
        self.slots.insert(
            name,
            Slot {
                consumer,
                checkpoints,
                progress: Arc::new(progress),
                task: Mutex::new(None),
            },
        );
        Ok(())
    }

    /// Names of all registered consumers, sorted.
    pub fn consumer_names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    fn slot(&self, name: &str) -> Result<&Slot> {
        self.slots
            .get(name)
            .ok_or_else(|| ConsumerError::UnknownConsumer(name.to_string()))
    }

    /// Starts every consumer that is not running yet.
    pub async fn start_all(&self) {
        for slot in self.slots.values() {
            self.ensure_started(slot).await;
        }
        tracing::info!(consumers = self.slots.len(), "consumer runtime started");
    }

    /// Starts one consumer from its checkpoint. No-op if it is running.
    pub async fn start(&self, name: &str) -> Result<()> {
        let slot = self.slot(name)?;
        self.ensure_started(slot).await;
        Ok(())
    }

    async fn ensure_started(&self, slot: &Slot) {
        let mut task = slot.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        *task = Some(self.spawn(slot, StartMode::Resume));
    }

    /// Stops a consumer. Its checkpoint is kept.
    pub async fn stop(&self, name: &str) -> Result<()> {
        let slot = self.slot(name)?;
        let mut task = slot.task.lock().await;
        stop_task(&mut task).await;

        let position = slot.progress.borrow().position;
        slot.progress.send_replace(ConsumerProgress {
            status: ConsumerStatus::Stopped,
            position,
        });
        tracing::info!(consumer = name, "consumer stopped");
        Ok(())
    }

    /// Resumes a failed consumer from its checkpoint.
    ///
    /// Returns `false` if the consumer was not failed.
    pub async fn retry(&self, name: &str) -> Result<bool> {
        let slot = self.slot(name)?;
        let mut task = slot.task.lock().await;
        if slot.progress.borrow().status != ConsumerStatus::Failed {
            return Ok(false);
        }

        stop_task(&mut task).await;
        let position = slot.progress.borrow().position;
        slot.progress.send_replace(ConsumerProgress {
            status: ConsumerStatus::Replaying,
            position,
        });
        *task = Some(self.spawn(slot, StartMode::Retry));
        tracing::info!(consumer = name, "consumer retry requested");
        Ok(true)
    }

    /// Clears a consumer's projection and replays every event.
    pub async fn rebuild(&self, name: &str) -> Result<()> {
        let slot = self.slot(name)?;
        let mut task = slot.task.lock().await;
        stop_task(&mut task).await;
        slot.progress.send_replace(ConsumerProgress {
            status: ConsumerStatus::Replaying,
            position: GlobalPosition::START,
        });
        *task = Some(self.spawn(slot, StartMode::Rebuild));
        tracing::info!(consumer = name, "consumer rebuild requested");
        Ok(())
    }

    /// Persisted state of every registered consumer.
    pub async fn states(&self) -> Result<Vec<ConsumerState>> {
        let mut states = Vec::with_capacity(self.slots.len());
        for (name, slot) in &self.slots {
            let state = slot
                .checkpoints
                .load(name)
                .await?
                .unwrap_or_else(|| ConsumerState::new(name.clone()));
            states.push(state);
        }
        Ok(states)
    }

    /// Watches the progress of one consumer.
    pub fn progress(&self, name: &str) -> Option<watch::Receiver<ConsumerProgress>> {
        self.slots.get(name).map(|slot| slot.progress.subscribe())
    }

    /// Current progress of every consumer, sorted by name.
    pub fn statuses(&self) -> Vec<(String, ConsumerProgress)> {
        self.slots
            .iter()
            .map(|(name, slot)| (name.clone(), *slot.progress.borrow()))
            .collect()
    }

    /// Stops every consumer.
    pub async fn shutdown(&self) {
        for name in self.slots.keys() {
            // The name comes from the map itself
            let _ = self.stop(name).await;
        }
        tracing::info!("consumer runtime stopped");
    }

    fn spawn(&self, slot: &Slot, mode: StartMode) -> JoinHandle<()> {
        let worker = Worker {
            store: self.store.clone(),
            checkpoints: Arc::clone(&slot.checkpoints),
            consumer: Arc::clone(&slot.consumer),
            progress: Arc::clone(&slot.progress),
            retry_policy: self.retry_policy,
        };
        tokio::spawn(worker.run(mode))
    }
}

impl<S> Drop for ConsumerRuntime<S> {
    fn drop(&mut self) {
        for slot in self.slots.values() {
            if let Ok(mut task) = slot.task.try_lock()
                && let Some(task) = task.take()
            {
                task.abort();
            }
        }
    }
}

async fn stop_task(task: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = task.take() {
        handle.abort();
        // Wait so the old task cannot write a checkpoint after this returns
        let _ = handle.await;
    }
}

/// Why a consumer stopped consuming.
struct Failure {
    error: ConsumerError,
    position: Option<GlobalPosition>,
}

impl Failure {
    fn new(error: impl Into<ConsumerError>) -> Self {
        Self {
            error: error.into(),
            position: None,
        }
    }

    fn at(error: impl Into<ConsumerError>, position: GlobalPosition) -> Self {
        Self {
            error: error.into(),
            position: Some(position),
        }
    }
}

struct Worker<S> {
    store: S,
    checkpoints: Arc<dyn CheckpointStore>,
    consumer: Arc<dyn EventConsumer>,
    progress: Arc<watch::Sender<ConsumerProgress>>,
    retry_policy: RetryPolicy,
}

impl<S: EventStore> Worker<S> {
    async fn run(self, mut mode: StartMode) {
        loop {
            self.consume(mode).await;

            match self.retry_policy {
                RetryPolicy::Manual => return,
                RetryPolicy::Interval(delay) => {
                    tokio::time::sleep(delay).await;
                    mode = StartMode::Retry;
                }
            }
        }
    }

    fn publish(&self, status: ConsumerStatus, position: GlobalPosition) {
        self.progress.send_replace(ConsumerProgress { status, position });
        metrics::gauge!("consumer_position", "consumer" => self.consumer.name().to_string())
            .set(position.as_i64() as f64);
    }

    fn count_failure(&self) {
        let consumer = self.consumer.name().to_string();
        metrics::counter!("consumer_failures_total", "consumer" => consumer).increment(1);
    }

    fn last_position(&self) -> GlobalPosition {
        self.progress.borrow().position
    }

    /// Runs the consumer until it fails. Always ends in the failed status.
    #[tracing::instrument(skip(self), fields(consumer = %self.consumer.name()))]
    async fn consume(&self, mode: StartMode) {
        let mut state = match self.prepare(mode).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                tracing::info!("consumer previously failed, waiting for retry");
                self.publish(ConsumerStatus::Failed, self.last_position());
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to prepare consumer");
                self.count_failure();
                let position = self.record_prepare_failure(mode, &err).await;
                self.publish(ConsumerStatus::Failed, position);
                return;
            }
        };

        let failure = self.process(&mut state).await;

        tracing::error!(
            error = %failure.error,
            position = ?failure.position,
            checkpoint = %state.position,
            "consumer failed"
        );
        self.count_failure();

        state.fail(failure.error.to_string(), failure.position);
        if let Err(err) = self.checkpoints.save(&state).await {
            tracing::warn!(error = %err, "failed to record consumer failure");
        }
        self.publish(ConsumerStatus::Failed, state.position);
    }

    /// Loads the state to start from. `None` means the consumer must stay failed.
    async fn prepare(&self, mode: StartMode) -> Result<Option<ConsumerState>> {
        let name = self.consumer.name();
        let saved = self.checkpoints.load(name).await?;

        let state = match (mode, saved) {
            (StartMode::Resume, Some(state)) if state.is_failed() => {
                self.progress.send_replace(ConsumerProgress {
                    status: ConsumerStatus::Failed,
                    position: state.position,
                });
                return Ok(None);
            }
            (StartMode::Rebuild, _) | (_, None) => {
                self.consumer.clear().await?;
                ConsumerState::new(name)
            }
            (_, Some(mut state)) => {
                // Nothing applied yet; an earlier clear may not have finished
                if state.position == GlobalPosition::START {
                    self.consumer.clear().await?;
                }
                state.recover();
                state
            }
        };

        self.checkpoints.save(&state).await?;
        Ok(Some(state))
    }

    /// Best-effort record of a failure before any envelope was consumed.
    async fn record_prepare_failure(&self, mode: StartMode, err: &ConsumerError) -> GlobalPosition {
        let name = self.consumer.name();
        let mut state = match self.checkpoints.load(name).await {
            Ok(Some(state)) if mode != StartMode::Rebuild => state,
            // A rebuild that failed must clear again when retried
            Ok(_) => ConsumerState::new(name),
            Err(load_err) => {
                tracing::warn!(error = %load_err, "failed to record consumer failure");
                return self.last_position();
            }
        };

        state.fail(err.to_string(), None);
        if let Err(save_err) = self.checkpoints.save(&state).await {
            tracing::warn!(error = %save_err, "failed to record consumer failure");
        }
        state.position
    }

    async fn process(&self, state: &mut ConsumerState) -> Failure {
        let name = self.consumer.name().to_string();
        let mut subscription = self
            .store
            .subscribe(state.position.next(), self.consumer.events_filter());
        let mut status = ConsumerStatus::Replaying;
        self.publish(status, state.position);
        tracing::info!(from = %state.position.next(), "consumer replaying");

        loop {
            let message = match subscription.next_message().await {
                Some(Ok(message)) => message,
                Some(Err(err)) => return Failure::new(err),
                None => {
                    return Failure::new(ConsumerError::Consumer(
                        "subscription closed".to_string(),
                    ));
                }
            };

            match message {
                SubscriptionMessage::Event(envelope) => {
                    let position = envelope.position();
                    if position <= state.position {
                        continue;
                    }

                    let applied = AssertUnwindSafe(self.consumer.on(&envelope))
                        .catch_unwind()
                        .await;
                    match applied {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => return Failure::at(err, position),
                        Err(_) => {
                            return Failure::at(
                                ConsumerError::Consumer("consumer panicked".to_string()),
                                position,
                            );
                        }
                    }

                    state.advance(position);
                    if let Err(err) = self.checkpoints.save(state).await {
                        return Failure::at(err, position);
                    }
                    metrics::counter!("consumer_events_processed_total", "consumer" => name.clone())
                        .increment(1);
                    self.publish(status, position);
                }
                SubscriptionMessage::CaughtUp { position } => {
                    if position > state.position {
                        state.advance(position);
                        if let Err(err) = self.checkpoints.save(state).await {
                            return Failure::new(err);
                        }
                    }
                    status = ConsumerStatus::Live;
                    tracing::info!(position = %state.position, "consumer live");
                    self.publish(status, state.position);
                }
            }
        }
    }
}
