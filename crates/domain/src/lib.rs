//! Command side of the content platform.
//!
//! This crate provides:
//! - [`CommandPipeline`], an ordered chain of [`CommandHandler`]s
//! - Cross-cutting handlers for timing, actor enrichment, and conflict retries
//! - [`AggregateRepository`] and [`AggregateHandler`] for event-sourced aggregates
//! - The [`App`] aggregate with its schemas and contributors

pub mod aggregate;
pub mod aggregate_handler;
pub mod app;
pub mod command;
pub mod error;
pub mod handlers;
pub mod pipeline;
pub mod repository;

pub use aggregate::{Aggregate, DomainEvent};
pub use aggregate_handler::{AggregateCommand, AggregateHandler};
pub use app::{
    APP_COMMAND_KINDS, APP_STREAM_CATEGORY, App, AppCommand, AppError, AppEvent, AppHandler,
    Schema,
};
pub use command::{Command, CommandContext, CommandResult};
pub use error::CommandError;
pub use handlers::{EnrichActorHandler, RetryOnConflictHandler, TimingHandler};
pub use pipeline::{CommandHandler, CommandPipeline, Next};
pub use repository::{AggregateRepository, Loaded};
