//! Consumer checkpoint persistence.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use event_store::GlobalPosition;
use sqlx::{PgPool, Row, postgres::PgRow};
use tokio::sync::RwLock;

use crate::Result;
use crate::state::{ConsumerHealth, ConsumerState};

/// Stores one [`ConsumerState`] per consumer name.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Loads the state saved for `name`, if any.
    async fn load(&self, name: &str) -> Result<Option<ConsumerState>>;

    /// Saves `state`, replacing any earlier state of the same consumer.
    async fn save(&self, state: &ConsumerState) -> Result<()>;

    /// Loads every saved state, ordered by name.
    async fn load_all(&self) -> Result<Vec<ConsumerState>>;
}

/// In-memory checkpoint store for single-node deployments and tests.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointStore {
    states: Arc<RwLock<HashMap<String, ConsumerState>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, name: &str) -> Result<Option<ConsumerState>> {
        Ok(self.states.read().await.get(name).cloned())
    }

    async fn save(&self, state: &ConsumerState) -> Result<()> {
        self.states
            .write()
            .await
            .insert(state.name.clone(), state.clone());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<ConsumerState>> {
        let mut states: Vec<_> = self.states.read().await.values().cloned().collect();
        states.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(states)
    }
}

const CHECKPOINT_COLUMNS: &str = "name, position, health, last_error, error_position, updated_at";

/// PostgreSQL checkpoint store backed by the `consumer_checkpoints` table.
#[derive(Clone)]
pub struct PostgresCheckpointStore {
    pool: PgPool,
}

impl PostgresCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_state(row: PgRow) -> Result<ConsumerState> {
        let health: String = row.try_get("health")?;
        let error_position: Option<i64> = row.try_get("error_position")?;

        Ok(ConsumerState {
            name: row.try_get("name")?,
            position: GlobalPosition::new(row.try_get("position")?),
            health: ConsumerHealth::parse(&health),
            last_error: row.try_get("last_error")?,
            error_position: error_position.map(GlobalPosition::new),
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl CheckpointStore for PostgresCheckpointStore {
    async fn load(&self, name: &str) -> Result<Option<ConsumerState>> {
        let row = sqlx::query(&format!(
            "SELECT {CHECKPOINT_COLUMNS} FROM consumer_checkpoints WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_state).transpose()
    }

    async fn save(&self, state: &ConsumerState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO consumer_checkpoints (name, position, health, last_error, error_position, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) DO UPDATE SET
                position = EXCLUDED.position,
                health = EXCLUDED.health,
                last_error = EXCLUDED.last_error,
                error_position = EXCLUDED.error_position,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&state.name)
        .bind(state.position.as_i64())
        .bind(state.health.as_str())
        .bind(&state.last_error)
        .bind(state.error_position.map(|p| p.as_i64()))
        .bind(state.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<ConsumerState>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHECKPOINT_COLUMNS} FROM consumer_checkpoints ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_state).collect()
    }
}
