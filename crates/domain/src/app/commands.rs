//! App commands.

use serde::Deserialize;

use crate::aggregate_handler::{AggregateCommand, AggregateHandler};
use crate::command::Command;
use crate::error::CommandError;

use super::{App, AppError, AppEvent};

/// Command kinds handled by the app aggregate.
pub const APP_COMMAND_KINDS: [&str; 6] = [
    "CreateApp",
    "CreateSchema",
    "PublishSchema",
    "DeleteSchema",
    "AssignContributor",
    "RemoveContributor",
];

fn default_role() -> String {
    "editor".to_string()
}

/// Commands understood by the app aggregate, keyed by [`Command::kind`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum AppCommand {
    /// Creates the app named by the stream key (`app-<name>`).
    CreateApp {},

    CreateSchema {
        schema: String,
        #[serde(default)]
        fields: Vec<String>,
    },

    PublishSchema {
        schema: String,
    },

    DeleteSchema {
        schema: String,
    },

    AssignContributor {
        contributor: String,
        #[serde(default = "default_role")]
        role: String,
    },

    RemoveContributor {
        contributor: String,
    },
}

/// Pipeline handler completing app commands.
pub type AppHandler<S> = AggregateHandler<S, AppCommand>;

impl AggregateCommand for AppCommand {
    type Aggregate = App;

    fn parse(command: &Command) -> Option<Result<Self, CommandError>> {
        if !APP_COMMAND_KINDS.contains(&command.kind.as_str()) {
            return None;
        }

        let payload = if command.payload.is_null() {
            serde_json::json!({})
        } else {
            command.payload.clone()
        };
        let tagged = serde_json::json!({ "kind": command.kind, "payload": payload });

        Some(
            serde_json::from_value(tagged).map_err(|err| CommandError::InvalidPayload {
                kind: command.kind.clone(),
                reason: err.to_string(),
            }),
        )
    }

    fn decide(self, app: &App, command: &Command) -> Result<Vec<AppEvent>, AppError> {
        match self {
            AppCommand::CreateApp {} => {
                let (_, name) = command
                    .stream_id
                    .as_str()
                    .split_once('-')
                    .ok_or_else(|| AppError::InvalidName(command.stream_id.to_string()))?;
                app.create(name, command.actor.as_deref())
            }
            AppCommand::CreateSchema { schema, fields } => app.create_schema(&schema, fields),
            AppCommand::PublishSchema { schema } => app.publish_schema(&schema),
            AppCommand::DeleteSchema { schema } => app.delete_schema(&schema),
            AppCommand::AssignContributor { contributor, role } => {
                app.assign_contributor(&contributor, &role)
            }
            AppCommand::RemoveContributor { contributor } => app.remove_contributor(&contributor),
        }
    }
}
