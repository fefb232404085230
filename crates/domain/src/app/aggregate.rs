//! App aggregate implementation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

use super::{APP_STREAM_CATEGORY, AppError, AppEvent};

/// Role given to the creator of an app.
pub const OWNER_ROLE: &str = "owner";

/// A content schema defined inside an app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<String>,
    pub published: bool,
}

/// App aggregate root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct App {
    name: Option<String>,
    created_by: Option<String>,
    schemas: BTreeMap<String, Schema>,

    /// Contributor id to role.
    contributors: BTreeMap<String, String>,
}

impl Aggregate for App {
    type Event = AppEvent;
    type Error = AppError;

    fn aggregate_type() -> &'static str {
        "App"
    }

    fn stream_category() -> &'static str {
        APP_STREAM_CATEGORY
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            AppEvent::AppCreated { name, created_by } => {
                self.name = Some(name);
                self.created_by = created_by;
            }
            AppEvent::SchemaCreated { schema, fields } => {
                self.schemas.insert(
                    schema,
                    Schema {
                        fields,
                        published: false,
                    },
                );
            }
            AppEvent::SchemaPublished { schema } => {
                if let Some(schema) = self.schemas.get_mut(&schema) {
                    schema.published = true;
                }
            }
            AppEvent::SchemaDeleted { schema } => {
                self.schemas.remove(&schema);
            }
            AppEvent::ContributorAssigned { contributor, role } => {
                self.contributors.insert(contributor, role);
            }
            AppEvent::ContributorRemoved { contributor } => {
                self.contributors.remove(&contributor);
            }
        }
    }
}

fn validate_name(name: &str) -> Result<(), AppError> {
    let valid = !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(AppError::InvalidName(name.to_string()))
    }
}

// Query methods
impl App {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    pub fn is_created(&self) -> bool {
        self.name.is_some()
    }

    pub fn has_schema(&self, schema: &str) -> bool {
        self.schemas.contains_key(schema)
    }

    pub fn schema(&self, schema: &str) -> Option<&Schema> {
        self.schemas.get(schema)
    }

    pub fn schemas(&self) -> impl Iterator<Item = (&str, &Schema)> {
        self.schemas.iter().map(|(name, schema)| (name.as_str(), schema))
    }

    /// Returns the role of a contributor, if assigned.
    pub fn role(&self, contributor: &str) -> Option<&str> {
        self.contributors.get(contributor).map(String::as_str)
    }

    pub fn contributor_count(&self) -> usize {
        self.contributors.len()
    }

    fn ensure_created(&self) -> Result<(), AppError> {
        if self.is_created() {
            Ok(())
        } else {
            Err(AppError::NotFound)
        }
    }
}

// Command methods (return events)
impl App {
    /// Creates the app. The creator, if known, becomes its owner.
    pub fn create(&self, name: &str, actor: Option<&str>) -> Result<Vec<AppEvent>, AppError> {
        if self.is_created() {
            return Err(AppError::AlreadyCreated);
        }
        validate_name(name)?;

        let mut events = vec![AppEvent::AppCreated {
            name: name.to_string(),
            created_by: actor.map(str::to_string),
        }];
        if let Some(actor) = actor {
            events.push(AppEvent::ContributorAssigned {
                contributor: actor.to_string(),
                role: OWNER_ROLE.to_string(),
            });
        }
        Ok(events)
    }

    pub fn create_schema(
        &self,
        schema: &str,
        fields: Vec<String>,
    ) -> Result<Vec<AppEvent>, AppError> {
        self.ensure_created()?;
        validate_name(schema)?;
        if self.has_schema(schema) {
            return Err(AppError::SchemaExists(schema.to_string()));
        }

        Ok(vec![AppEvent::SchemaCreated {
            schema: schema.to_string(),
            fields,
        }])
    }

    /// Publishes a schema. Publishing twice is a no-op.
    pub fn publish_schema(&self, schema: &str) -> Result<Vec<AppEvent>, AppError> {
        self.ensure_created()?;
        let existing = self
            .schemas
            .get(schema)
            .ok_or_else(|| AppError::SchemaNotFound(schema.to_string()))?;
        if existing.published {
            return Ok(vec![]);
        }

        Ok(vec![AppEvent::SchemaPublished {
            schema: schema.to_string(),
        }])
    }

    pub fn delete_schema(&self, schema: &str) -> Result<Vec<AppEvent>, AppError> {
        self.ensure_created()?;
        if !self.has_schema(schema) {
            return Err(AppError::SchemaNotFound(schema.to_string()));
        }

        Ok(vec![AppEvent::SchemaDeleted {
            schema: schema.to_string(),
        }])
    }

    /// Assigns a contributor or changes their role. Re-assigning the same
    /// role is a no-op.
    pub fn assign_contributor(
        &self,
        contributor: &str,
        role: &str,
    ) -> Result<Vec<AppEvent>, AppError> {
        self.ensure_created()?;
        if contributor.trim().is_empty() {
            return Err(AppError::InvalidName(contributor.to_string()));
        }
        validate_name(role)?;
        if self.role(contributor) == Some(role) {
            return Ok(vec![]);
        }

        Ok(vec![AppEvent::ContributorAssigned {
            contributor: contributor.to_string(),
            role: role.to_string(),
        }])
    }

    pub fn remove_contributor(&self, contributor: &str) -> Result<Vec<AppEvent>, AppError> {
        self.ensure_created()?;
        let role = self
            .role(contributor)
            .ok_or_else(|| AppError::ContributorNotFound(contributor.to_string()))?;

        let owners = self
            .contributors
            .values()
            .filter(|r| r.as_str() == OWNER_ROLE)
            .count();
        if role == OWNER_ROLE && owners == 1 {
            return Err(AppError::LastOwner(contributor.to_string()));
        }

        Ok(vec![AppEvent::ContributorRemoved {
            contributor: contributor.to_string(),
        }])
    }
}
