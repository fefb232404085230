//! The app aggregate: an application of the content platform with its
//! schemas and contributors.

mod aggregate;
mod commands;
mod events;

pub use aggregate::{App, Schema};
pub use commands::{APP_COMMAND_KINDS, AppCommand, AppHandler};
pub use events::AppEvent;

use thiserror::Error;

/// Stream category of app streams (`app-<name>`).
pub const APP_STREAM_CATEGORY: &str = "app";

/// Reasons an app refuses a command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("App already created")]
    AlreadyCreated,

    #[error("App does not exist")]
    NotFound,

    /// Names must be non-empty lowercase letters, digits, and dashes.
    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    #[error("Schema already exists: {0}")]
    SchemaExists(String),

    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    #[error("Contributor not found: {0}")]
    ContributorNotFound(String),

    #[error("Cannot remove the last owner: {0}")]
    LastOwner(String),
}
