//! App domain events.

use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

/// Events that can occur on an app aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AppEvent {
    AppCreated {
        name: String,
        #[serde(default)]
        created_by: Option<String>,
    },

    SchemaCreated {
        schema: String,
        #[serde(default)]
        fields: Vec<String>,
    },

    SchemaPublished {
        schema: String,
    },

    SchemaDeleted {
        schema: String,
    },

    /// A contributor joined the app, or changed role.
    ContributorAssigned {
        contributor: String,
        role: String,
    },

    ContributorRemoved {
        contributor: String,
    },
}

impl DomainEvent for AppEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AppEvent::AppCreated { .. } => "AppCreated",
            AppEvent::SchemaCreated { .. } => "SchemaCreated",
            AppEvent::SchemaPublished { .. } => "SchemaPublished",
            AppEvent::SchemaDeleted { .. } => "SchemaDeleted",
            AppEvent::ContributorAssigned { .. } => "ContributorAssigned",
            AppEvent::ContributorRemoved { .. } => "ContributorRemoved",
        }
    }
}
