//! HTTP route handlers.

pub mod apps;
pub mod commands;
pub mod consumers;
pub mod health;
pub mod metrics;
