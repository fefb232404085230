//! Generic completing handler for aggregate commands.

use std::collections::HashMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use event_store::EventStore;

use crate::aggregate::Aggregate;
use crate::command::{Command, CommandContext};
use crate::error::CommandError;
use crate::pipeline::{CommandHandler, Next};
use crate::repository::AggregateRepository;

type EventOf<C> = <<C as AggregateCommand>::Aggregate as Aggregate>::Event;
type ErrorOf<C> = <<C as AggregateCommand>::Aggregate as Aggregate>::Error;

/// A typed command targeting one aggregate type.
pub trait AggregateCommand: Sized + Send {
    type Aggregate: Aggregate;

    /// Decodes a pipeline command.
    ///
    /// Returns `None` when the command's kind belongs to someone else, and
    /// `Some(Err(_))` when the kind matches but the payload does not.
    fn parse(command: &Command) -> Option<Result<Self, CommandError>>;

    /// Decides which events the command produces against the current state.
    fn decide(
        self,
        aggregate: &Self::Aggregate,
        command: &Command,
    ) -> Result<Vec<EventOf<Self>>, ErrorOf<Self>>;
}

/// Completes every command `C` recognizes: load, decide, append.
pub struct AggregateHandler<S, C: AggregateCommand> {
    repository: AggregateRepository<S, C::Aggregate>,
    _command: PhantomData<fn() -> C>,
}

impl<S, C> AggregateHandler<S, C>
where
    S: EventStore,
    C: AggregateCommand,
{
    pub fn new(repository: AggregateRepository<S, C::Aggregate>) -> Self {
        Self {
            repository,
            _command: PhantomData,
        }
    }
}

/// Metadata stamped on every event a command appends.
fn event_metadata(command: &Command) -> HashMap<String, serde_json::Value> {
    let mut metadata = command.metadata.clone();
    metadata.insert(
        "command_id".to_string(),
        serde_json::json!(command.command_id),
    );
    metadata.insert("command_kind".to_string(), serde_json::json!(command.kind));
    if let Some(actor) = &command.actor {
        metadata.insert("actor".to_string(), serde_json::json!(actor));
    }
    metadata
}

#[async_trait]
impl<S, C> CommandHandler for AggregateHandler<S, C>
where
    S: EventStore,
    C: AggregateCommand + 'static,
{
    fn name(&self) -> &'static str {
        <C::Aggregate as Aggregate>::aggregate_type()
    }

    async fn handle(&self, ctx: &mut CommandContext, next: Next<'_>) -> Result<(), CommandError> {
        let typed = match C::parse(ctx.command()) {
            None => return next.run(ctx).await,
            Some(parsed) => parsed?,
        };

        let command = ctx.command();
        let category = <C::Aggregate as Aggregate>::stream_category();
        if command.stream_id.category() != category {
            return Err(CommandError::InvalidPayload {
                kind: command.kind.clone(),
                reason: format!("stream {} is not a {category} stream", command.stream_id),
            });
        }

        let loaded = self.repository.load(&command.stream_id).await?;
        if let Some(expected) = command.expected_version
            && expected != loaded.version
        {
            return Err(CommandError::ConcurrencyConflict {
                stream_id: loaded.stream_id,
                expected,
                actual: loaded.version,
            });
        }

        let events = typed
            .decide(&loaded.aggregate, command)
            .map_err(|err| CommandError::Rejected(err.to_string()))?;
        let metadata = event_metadata(command);
        let (_, result) = self.repository.save(loaded, events, &metadata).await?;

        ctx.complete(result)
    }
}
