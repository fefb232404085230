//! Commands and the mutable context handed along the pipeline.

use std::collections::HashMap;

use common::CommitId;
use event_store::{AppendResult, EventData, GlobalPosition, StreamId, Version};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CommandError;

/// A request to change exactly one aggregate.
///
/// `kind` is the discriminator handlers dispatch on; `payload` carries the
/// kind-specific arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub command_id: Uuid,
    pub kind: String,
    pub stream_id: StreamId,

    /// Version the caller based the command on. `None` means "whatever is
    /// current when the command runs".
    #[serde(default)]
    pub expected_version: Option<Version>,

    pub payload: serde_json::Value,

    /// Acting user, usually filled in by an enrichment handler.
    #[serde(default)]
    pub actor: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Command {
    pub fn new(kind: impl Into<String>, stream_id: StreamId, payload: serde_json::Value) -> Self {
        Self {
            command_id: Uuid::new_v4(),
            kind: kind.into(),
            stream_id,
            expected_version: None,
            payload,
            actor: None,
            metadata: HashMap::new(),
        }
    }

    /// Pins the version the command was based on.
    pub fn with_expected_version(mut self, version: Version) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Outcome of a completed command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    pub stream_id: StreamId,

    /// Stream version after the command.
    pub version: Version,

    /// Events appended by the command, in order. Empty for a no-op.
    pub events: Vec<EventData>,

    /// Commit shared by the appended events, if any were appended.
    pub commit_id: Option<CommitId>,

    pub first_position: Option<GlobalPosition>,
    pub last_position: Option<GlobalPosition>,
}

impl CommandResult {
    /// Result of a command that appended `events`.
    pub fn appended(append: AppendResult, events: Vec<EventData>) -> Self {
        Self {
            stream_id: append.stream_id,
            version: append.version,
            events,
            commit_id: Some(append.commit_id),
            first_position: Some(append.first_position),
            last_position: Some(append.last_position),
        }
    }

    /// Result of a command that was accepted but changed nothing.
    pub fn unchanged(stream_id: StreamId, version: Version) -> Self {
        Self {
            stream_id,
            version,
            events: Vec::new(),
            commit_id: None,
            first_position: None,
            last_position: None,
        }
    }
}

/// State shared by the handlers processing one command.
#[derive(Debug)]
pub struct CommandContext {
    command: Command,
    completion: Option<CommandResult>,
    attempts: u32,
}

impl CommandContext {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            completion: None,
            attempts: 0,
        }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Mutable access for handlers enriching the command before passing it on.
    pub fn command_mut(&mut self) -> &mut Command {
        &mut self.command
    }

    pub fn is_complete(&self) -> bool {
        self.completion.is_some()
    }

    pub fn result(&self) -> Option<&CommandResult> {
        self.completion.as_ref()
    }

    /// Marks the command as handled. Only one handler may do this.
    pub fn complete(&mut self, result: CommandResult) -> Result<(), CommandError> {
        if self.completion.is_some() {
            return Err(CommandError::AlreadyCompleted);
        }
        self.completion = Some(result);
        Ok(())
    }

    /// Number of retries performed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Prepares the context for another run of the downstream chain.
    pub(crate) fn begin_retry(&mut self) {
        self.attempts += 1;
        self.completion = None;
    }

    pub fn into_result(self) -> Option<CommandResult> {
        self.completion
    }
}
