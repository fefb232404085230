//! Contributors read model: who works on which app, and in what role.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::AppEvent;
use event_store::{Envelope, EventFilter, GlobalPosition, StreamId};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::consumer::EventConsumer;
use crate::read_model::ReadModel;

pub const CONTRIBUTORS_CONSUMER: &str = "app-contributors";

const CONTRIBUTOR_EVENTS: &str = "^(AppCreated|Contributor(Assigned|Removed))$";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contributor {
    pub contributor: String,
    pub role: String,
    pub since: DateTime<Utc>,
}

#[derive(Default)]
struct Contributors {
    apps: HashMap<StreamId, BTreeMap<String, Contributor>>,
    last_position: GlobalPosition,
}

/// Current contributors per app stream.
#[derive(Clone, Default)]
pub struct ContributorsView {
    state: Arc<RwLock<Contributors>>,
}

impl ContributorsView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contributors of one app, ordered by name. Empty for unknown apps.
    pub async fn contributors_of(&self, app: &StreamId) -> Vec<Contributor> {
        self.state
            .read()
            .await
            .apps
            .get(app)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn role_of(&self, app: &StreamId, contributor: &str) -> Option<String> {
        self.state
            .read()
            .await
            .apps
            .get(app)
            .and_then(|c| c.get(contributor))
            .map(|c| c.role.clone())
    }

    /// Apps the contributor currently works on.
    pub async fn apps_of(&self, contributor: &str) -> Vec<StreamId> {
        let state = self.state.read().await;
        let mut apps: Vec<_> = state
            .apps
            .iter()
            .filter(|(_, c)| c.contains_key(contributor))
            .map(|(app, _)| app.clone())
            .collect();
        apps.sort();
        apps
    }

    pub async fn position(&self) -> GlobalPosition {
        self.state.read().await.last_position
    }
}

#[async_trait]
impl EventConsumer for ContributorsView {
    fn name(&self) -> &str {
        CONTRIBUTORS_CONSUMER
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn events_filter(&self) -> EventFilter {
        // The pattern is a constant, so this cannot fail at runtime
        EventFilter::event_types(CONTRIBUTOR_EVENTS).unwrap_or_else(|_| EventFilter::all())
    }

    async fn clear(&self) -> Result<()> {
        *self.state.write().await = Contributors::default();
        Ok(())
    }

    async fn on(&self, envelope: &Envelope) -> Result<()> {
        let mut state = self.state.write().await;
        if envelope.position() <= state.last_position {
            return Ok(());
        }

        let event: AppEvent = envelope.event.payload_as()?;
        let app = envelope.stream_id().clone();

        match event {
            AppEvent::AppCreated { .. } => {
                state.apps.entry(app).or_default();
            }
            AppEvent::ContributorAssigned { contributor, role } => {
                let since = envelope.event.timestamp;
                state.apps.entry(app).or_default().insert(
                    contributor.clone(),
                    Contributor {
                        contributor,
                        role,
                        since,
                    },
                );
            }
            AppEvent::ContributorRemoved { contributor } => {
                if let Some(contributors) = state.apps.get_mut(&app) {
                    contributors.remove(&contributor);
                }
            }
            _ => {}
        }

        state.last_position = envelope.position();
        Ok(())
    }
}

#[async_trait]
impl ReadModel for ContributorsView {
    /// Number of apps known to the view.
    async fn entries(&self) -> usize {
        self.state.read().await.apps.len()
    }

    async fn applied_position(&self) -> GlobalPosition {
        self.position().await
    }
}

#[cfg(test)]
mod tests {
    use domain::DomainEvent;
    use event_store::{CommitId, Event, EventData};

    use super::*;

    fn envelope(stream: &str, position: i64, event: &AppEvent) -> Envelope {
        let data = EventData::from_payload(event.event_type(), event).unwrap();
        Envelope::new(
            Event::from_data(
                data,
                StreamId::from(stream),
                position - 1,
                GlobalPosition::new(position),
                CommitId::new(),
                Utc::now(),
            ),
            true,
        )
    }

    fn assigned(contributor: &str, role: &str) -> AppEvent {
        AppEvent::ContributorAssigned {
            contributor: contributor.to_string(),
            role: role.to_string(),
        }
    }

    #[tokio::test]
    async fn follows_assignments_and_removals() {
        let view = ContributorsView::new();
        let app = StreamId::from("app-42");
        let created = AppEvent::AppCreated {
            name: "42".to_string(),
            created_by: Some("alice".to_string()),
        };

        view.on(&envelope("app-42", 1, &created)).await.unwrap();
        view.on(&envelope("app-42", 2, &assigned("alice", "owner"))).await.unwrap();
        view.on(&envelope("app-42", 3, &assigned("bob", "editor"))).await.unwrap();
        view.on(&envelope("app-42", 4, &assigned("bob", "owner"))).await.unwrap();

        let names: Vec<_> = view
            .contributors_of(&app)
            .await
            .into_iter()
            .map(|c| c.contributor)
            .collect();
        assert_eq!(names, vec!["alice", "bob"]);
        assert_eq!(view.role_of(&app, "bob").await.as_deref(), Some("owner"));

        let removed = AppEvent::ContributorRemoved {
            contributor: "alice".to_string(),
        };
        view.on(&envelope("app-42", 5, &removed)).await.unwrap();
        assert!(view.role_of(&app, "alice").await.is_none());
        assert!(view.apps_of("alice").await.is_empty());
        assert_eq!(view.apps_of("bob").await, vec![app]);
    }

    #[tokio::test]
    async fn created_app_without_contributors_is_counted() {
        let view = ContributorsView::new();
        let created = AppEvent::AppCreated {
            name: "7".to_string(),
            created_by: None,
        };
        view.on(&envelope("app-7", 1, &created)).await.unwrap();

        assert_eq!(view.entries().await, 1);
        assert!(view.contributors_of(&StreamId::from("app-7")).await.is_empty());
    }

    #[tokio::test]
    async fn replaying_old_positions_changes_nothing() {
        let view = ContributorsView::new();
        let app = StreamId::from("app-1");
        let editor = envelope("app-1", 1, &assigned("bob", "editor"));

        view.on(&editor).await.unwrap();
        view.on(&envelope("app-1", 2, &assigned("bob", "viewer"))).await.unwrap();
        view.on(&editor).await.unwrap();

        assert_eq!(view.role_of(&app, "bob").await.as_deref(), Some("viewer"));
        assert_eq!(view.position().await, GlobalPosition::new(2));
    }

    #[test]
    fn filter_selects_contributor_events() {
        let filter = ContributorsView::new().events_filter();
        assert!(filter.matches_parts("app-1", "AppCreated"));
        assert!(filter.matches_parts("app-1", "ContributorRemoved"));
        assert!(!filter.matches_parts("app-1", "SchemaCreated"));
    }
}
