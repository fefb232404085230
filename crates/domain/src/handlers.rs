//! Cross-cutting pipeline handlers.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;

use crate::command::CommandContext;
use crate::error::CommandError;
use crate::pipeline::{CommandHandler, Next};

/// Measures how long the rest of the chain takes and records the outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimingHandler;

#[async_trait]
impl CommandHandler for TimingHandler {
    fn name(&self) -> &'static str {
        "timing"
    }

    async fn handle(&self, ctx: &mut CommandContext, next: Next<'_>) -> Result<(), CommandError> {
        let start = Instant::now();
        let result = next.run(ctx).await;
        let elapsed = start.elapsed();

        let kind = ctx.command().kind.clone();
        let outcome = match &result {
            Ok(()) if ctx.is_complete() => "success",
            Ok(()) => "unhandled",
            Err(err) => err.outcome(),
        };

        metrics::histogram!("command_duration_seconds", "kind" => kind.clone())
            .record(elapsed.as_secs_f64());
        metrics::counter!("commands_total", "kind" => kind.clone(), "outcome" => outcome)
            .increment(1);

        match &result {
            Err(err) => tracing::warn!(
                %kind,
                outcome,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %err,
                "command failed"
            ),
            Ok(()) => tracing::info!(
                %kind,
                outcome,
                elapsed_ms = elapsed.as_millis() as u64,
                "command handled"
            ),
        }

        result
    }
}

/// Fills in a missing actor and stamps the time the command was received.
#[derive(Debug, Clone)]
pub struct EnrichActorHandler {
    default_actor: String,
}

impl EnrichActorHandler {
    pub fn new(default_actor: impl Into<String>) -> Self {
        Self {
            default_actor: default_actor.into(),
        }
    }
}

#[async_trait]
impl CommandHandler for EnrichActorHandler {
    fn name(&self) -> &'static str {
        "enrich-actor"
    }

    async fn handle(&self, ctx: &mut CommandContext, next: Next<'_>) -> Result<(), CommandError> {
        let command = ctx.command_mut();
        if command.actor.as_deref().is_none_or(str::is_empty) {
            command.actor = Some(self.default_actor.clone());
        }
        command
            .metadata
            .entry("received_at".to_string())
            .or_insert_with(|| serde_json::json!(Utc::now().to_rfc3339()));

        next.run(ctx).await
    }
}

/// Re-runs the rest of the chain when it fails with a concurrency conflict.
///
/// Each run re-reads the target stream, so the command is decided against
/// the state that won the race. Commands pinned to an explicit expected
/// version are never retried: their caller asked for that exact state.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnConflictHandler {
    max_retries: u32,
}

impl RetryOnConflictHandler {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

#[async_trait]
impl CommandHandler for RetryOnConflictHandler {
    fn name(&self) -> &'static str {
        "retry-on-conflict"
    }

    async fn handle(&self, ctx: &mut CommandContext, next: Next<'_>) -> Result<(), CommandError> {
        loop {
            match next.run(ctx).await {
                Err(err)
                    if err.is_retryable()
                        && ctx.command().expected_version.is_none()
                        && ctx.attempts() < self.max_retries =>
                {
                    ctx.begin_retry();
                    tracing::debug!(
                        kind = %ctx.command().kind,
                        attempt = ctx.attempts(),
                        error = %err,
                        "retrying after conflict"
                    );
                    metrics::counter!("command_retries_total").increment(1);
                }
                other => return other,
            }
        }
    }
}
