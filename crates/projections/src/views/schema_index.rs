//! Schema index read model: every schema of every app.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::AppEvent;
use event_store::{Envelope, EventFilter, GlobalPosition, StreamId};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::consumer::EventConsumer;
use crate::read_model::ReadModel;
use crate::{ConsumerError, Result};

pub const SCHEMA_INDEX_CONSUMER: &str = "schema-index";

const SCHEMA_EVENTS: &str = "^Schema(Created|Published|Deleted)$";

/// One schema as seen by the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaEntry {
    pub app: StreamId,
    pub schema: String,
    pub fields: Vec<String>,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct SchemaIndex {
    entries: BTreeMap<(StreamId, String), SchemaEntry>,
    last_position: GlobalPosition,
}

/// Live schemas grouped by app stream. Deleted schemas drop out.
#[derive(Clone, Default)]
pub struct SchemaIndexView {
    index: Arc<RwLock<SchemaIndex>>,
}

impl SchemaIndexView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schemas of one app, ordered by name.
    pub async fn schemas_for(&self, app: &StreamId) -> Vec<SchemaEntry> {
        self.index
            .read()
            .await
            .entries
            .values()
            .filter(|entry| &entry.app == app)
            .cloned()
            .collect()
    }

    pub async fn get(&self, app: &StreamId, schema: &str) -> Option<SchemaEntry> {
        self.index
            .read()
            .await
            .entries
            .get(&(app.clone(), schema.to_string()))
            .cloned()
    }

    /// Published schemas across all apps.
    pub async fn published(&self) -> Vec<SchemaEntry> {
        self.index
            .read()
            .await
            .entries
            .values()
            .filter(|entry| entry.published)
            .cloned()
            .collect()
    }

    /// Position of the last envelope applied.
    pub async fn position(&self) -> GlobalPosition {
        self.index.read().await.last_position
    }
}

#[async_trait]
impl EventConsumer for SchemaIndexView {
    fn name(&self) -> &str {
        SCHEMA_INDEX_CONSUMER
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn events_filter(&self) -> EventFilter {
        // The pattern is a constant, so this cannot fail at runtime
        EventFilter::event_types(SCHEMA_EVENTS).unwrap_or_else(|_| EventFilter::all())
    }

    async fn clear(&self) -> Result<()> {
        *self.index.write().await = SchemaIndex::default();
        Ok(())
    }

    async fn on(&self, envelope: &Envelope) -> Result<()> {
        let mut index = self.index.write().await;
        if envelope.position() <= index.last_position {
            return Ok(());
        }

        let event: AppEvent = envelope.event.payload_as()?;
        let app = envelope.stream_id().clone();
        let timestamp = envelope.event.timestamp;

        match event {
            AppEvent::SchemaCreated { schema, fields } => {
                let entry = SchemaEntry {
                    app: app.clone(),
                    schema: schema.clone(),
                    fields,
                    published: false,
                    created_at: timestamp,
                    updated_at: timestamp,
                };
                index.entries.insert((app, schema), entry);
            }
            AppEvent::SchemaPublished { schema } => {
                let entry = index.entries.get_mut(&(app, schema.clone())).ok_or_else(|| {
                    ConsumerError::Consumer(format!("published unknown schema {schema}"))
                })?;
                entry.published = true;
                entry.updated_at = timestamp;
            }
            AppEvent::SchemaDeleted { schema } => {
                index.entries.remove(&(app, schema));
            }
            _ => {}
        }

        index.last_position = envelope.position();
        Ok(())
    }
}

#[async_trait]
impl ReadModel for SchemaIndexView {
    async fn entries(&self) -> usize {
        self.index.read().await.entries.len()
    }

    async fn applied_position(&self) -> GlobalPosition {
        self.position().await
    }
}
