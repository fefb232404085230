//! Chain-of-responsibility command dispatch.
//!
//! Handlers run in registration order. Each one either completes the
//! command and stops, or does its cross-cutting work around a call to
//! [`Next::run`], which runs the rest of the chain and then returns control.

use std::sync::Arc;

use async_trait::async_trait;

use crate::command::{Command, CommandContext, CommandResult};
use crate::error::CommandError;

/// A step of the command pipeline.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Handles the command or passes it on through `next`.
    ///
    /// A handler that completes the context must not call `next` afterwards.
    async fn handle(&self, ctx: &mut CommandContext, next: Next<'_>) -> Result<(), CommandError>;
}

/// The remainder of the chain after the current handler.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    handlers: &'a [Arc<dyn CommandHandler>],
}

impl<'a> Next<'a> {
    fn new(handlers: &'a [Arc<dyn CommandHandler>]) -> Self {
        Self { handlers }
    }

    /// Runs the downstream handlers. Returns once they all returned.
    pub async fn run(self, ctx: &mut CommandContext) -> Result<(), CommandError> {
        if ctx.is_complete() {
            return Err(CommandError::AlreadyCompleted);
        }
        match self.handlers.split_first() {
            Some((handler, rest)) => {
                tracing::trace!(handler = handler.name(), "invoking handler");
                handler.handle(ctx, Next::new(rest)).await
            }
            None => Ok(()),
        }
    }

    /// Number of handlers left in the chain.
    pub fn remaining(&self) -> usize {
        self.handlers.len()
    }
}

/// Ordered list of command handlers.
#[derive(Clone, Default)]
pub struct CommandPipeline {
    handlers: Vec<Arc<dyn CommandHandler>>,
}

impl CommandPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler to the end of the chain.
    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) {
        self.handlers.push(handler);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_handler(mut self, handler: impl CommandHandler + 'static) -> Self {
        self.register(Arc::new(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs a command through the chain.
    #[tracing::instrument(
        skip(self, command),
        fields(kind = %command.kind, stream_id = %command.stream_id)
    )]
    pub async fn handle(&self, command: Command) -> Result<CommandResult, CommandError> {
        let kind = command.kind.clone();
        let mut ctx = CommandContext::new(command);
        self.handle_context(&mut ctx).await?;
        ctx.into_result()
            .ok_or(CommandError::Unhandled { kind })
    }

    /// Runs the chain over an existing context.
    pub async fn handle_context(&self, ctx: &mut CommandContext) -> Result<(), CommandError> {
        Next::new(&self.handlers).run(ctx).await
    }
}
