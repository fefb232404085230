//! Persisted consumer state and observable runtime status.

use chrono::{DateTime, Utc};
use event_store::GlobalPosition;
use serde::{Deserialize, Serialize};

/// Persisted health of a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerHealth {
    Running,
    Failed,
}

impl ConsumerHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumerHealth::Running => "running",
            ConsumerHealth::Failed => "failed",
        }
    }

    /// Parses the stored form. Anything unknown counts as running.
    pub fn parse(value: &str) -> Self {
        match value {
            "failed" => ConsumerHealth::Failed,
            _ => ConsumerHealth::Running,
        }
    }
}

/// Checkpoint and health of one consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerState {
    pub name: String,

    /// Last global position the consumer has fully processed.
    pub position: GlobalPosition,

    pub health: ConsumerHealth,
    pub last_error: Option<String>,

    /// Position of the envelope that caused the last failure.
    pub error_position: Option<GlobalPosition>,

    pub updated_at: DateTime<Utc>,
}

impl ConsumerState {
    /// State of a consumer that has processed nothing.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: GlobalPosition::START,
            health: ConsumerHealth::Running,
            last_error: None,
            error_position: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.health == ConsumerHealth::Failed
    }

    /// Moves the checkpoint forward. Never moves it back.
    pub fn advance(&mut self, position: GlobalPosition) {
        if position > self.position {
            self.position = position;
        }
        self.updated_at = Utc::now();
    }

    /// Records a failure. The checkpoint stays on the last good position.
    pub fn fail(&mut self, error: impl Into<String>, position: Option<GlobalPosition>) {
        self.health = ConsumerHealth::Failed;
        self.last_error = Some(error.into());
        self.error_position = position;
        self.updated_at = Utc::now();
    }

    /// Clears a recorded failure.
    pub fn recover(&mut self) {
        self.health = ConsumerHealth::Running;
        self.last_error = None;
        self.error_position = None;
        self.updated_at = Utc::now();
    }
}

/// Lifecycle of a consumer inside a running node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerStatus {
    Stopped,
    Replaying,
    Live,
    Failed,
}

impl std::fmt::Display for ConsumerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            ConsumerStatus::Stopped => "stopped",
            ConsumerStatus::Replaying => "replaying",
            ConsumerStatus::Live => "live",
            ConsumerStatus::Failed => "failed",
        };
        f.write_str(status)
    }
}

/// Snapshot of a consumer's progress, published on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerProgress {
    pub status: ConsumerStatus,
    pub position: GlobalPosition,
}

impl Default for ConsumerProgress {
    fn default() -> Self {
        Self {
            status: ConsumerStatus::Stopped,
            position: GlobalPosition::START,
        }
    }
}
