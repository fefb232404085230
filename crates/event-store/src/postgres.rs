use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgRow};
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    CommitId, Event, EventData, EventFilter, EventId, EventStoreError, EventSubscription,
    GlobalPosition, Result, StreamId, SubscriptionOptions, Version,
    store::{AppendResult, EventStore, validate_events_for_append},
};

const EVENT_COLUMNS: &str =
    "position, event_id, stream_id, sequence, event_type, payload, metadata, commit_id, timestamp";

/// PostgreSQL-backed event store implementation.
///
/// Global positions come from a `BIGSERIAL` column, allocated before commit.
/// Reads only return rows written by transactions older than every
/// transaction still running; subscriptions additionally hold back at any
/// position gap (see [`SubscriptionOptions::gap_timeout`]) so a lower position
/// that commits late is still delivered.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
    head: Arc<watch::Sender<GlobalPosition>>,
    options: SubscriptionOptions,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self::with_options(pool, SubscriptionOptions::default())
    }

    /// Creates a store whose subscriptions use `options`.
    pub fn with_options(pool: PgPool, options: SubscriptionOptions) -> Self {
        let (head, _) = watch::channel(GlobalPosition::START);
        Self {
            pool,
            head: Arc::new(head),
            options,
        }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn advance_head(&self, position: GlobalPosition) {
        self.head.send_if_modified(|head| {
            if position > *head {
                *head = position;
                true
            } else {
                false
            }
        });
    }

    fn row_to_event(row: PgRow) -> Result<Event> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

        Ok(Event {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            event_type: row.try_get("event_type")?,
            stream_id: StreamId::new(row.try_get::<String, _>("stream_id")?),
            sequence: row.try_get("sequence")?,
            position: GlobalPosition::new(row.try_get("position")?),
            timestamp: row.try_get("timestamp")?,
            payload: row.try_get("payload")?,
            metadata,
            commit_id: CommitId::from_uuid(row.try_get::<Uuid, _>("commit_id")?),
        })
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip(self, events), fields(count = events.len()))]
    async fn append(
        &self,
        stream_id: &StreamId,
        expected_version: Version,
        events: Vec<EventData>,
    ) -> Result<AppendResult> {
        validate_events_for_append(&events)?;

        let mut tx = self.pool.begin().await?;

        let last_sequence: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sequence) FROM events WHERE stream_id = $1")
                .bind(stream_id.as_str())
                .fetch_one(&mut *tx)
                .await?;
        let actual = Version::new(last_sequence.map_or(0, |s| s + 1));

        if actual != expected_version {
            metrics::counter!("event_store_conflicts_total").increment(1);
            return Err(EventStoreError::ConcurrencyConflict {
                stream_id: stream_id.clone(),
                expected: expected_version,
                actual,
            });
        }

        let commit_id = CommitId::new();
        let timestamp = Utc::now();
        let count = events.len();
        let mut first_position = None;
        let mut last_position = GlobalPosition::START;

        for (offset, event) in events.into_iter().enumerate() {
            let metadata_json = serde_json::to_value(&event.metadata)?;
            let sequence = expected_version.as_i64() + offset as i64;

            let position: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO events (event_id, stream_id, sequence, event_type, payload, metadata, commit_id, timestamp)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING position
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(stream_id.as_str())
            .bind(sequence)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(metadata_json)
            .bind(commit_id.as_uuid())
            .bind(timestamp)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                // A concurrent writer committed the same sequence first
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_stream_sequence")
                {
                    metrics::counter!("event_store_conflicts_total").increment(1);
                    return EventStoreError::ConcurrencyConflict {
                        stream_id: stream_id.clone(),
                        expected: expected_version,
                        actual: Version::new(sequence + 1),
                    };
                }
                EventStoreError::Database(e)
            })?;

            let position = GlobalPosition::new(position);
            first_position.get_or_insert(position);
            last_position = position;
        }

        tx.commit().await?;

        self.advance_head(last_position);
        metrics::counter!("events_appended_total").increment(count as u64);

        Ok(AppendResult {
            stream_id: stream_id.clone(),
            commit_id,
            version: expected_version.advanced_by(count),
            first_position: first_position.unwrap_or(last_position),
            last_position,
        })
    }

    async fn read_stream(&self, stream_id: &StreamId, from_version: Version) -> Result<Vec<Event>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE stream_id = $1 AND sequence >= $2 ORDER BY sequence ASC"
        ))
        .bind(stream_id.as_str())
        .bind(from_version.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn stream_version(&self, stream_id: &StreamId) -> Result<Version> {
        let last_sequence: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sequence) FROM events WHERE stream_id = $1")
                .bind(stream_id.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(Version::new(last_sequence.map_or(0, |s| s + 1)))
    }

    async fn read_all(&self, from: GlobalPosition, max_count: usize) -> Result<Vec<Event>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events
            WHERE position >= $1
              AND transaction_id < pg_snapshot_xmin(pg_current_snapshot())
            ORDER BY position ASC
            LIMIT $2
            "#
        ))
        .bind(from.as_i64())
        .bind(max_count.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn head_position(&self) -> Result<GlobalPosition> {
        let position: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(position), 0) FROM events")
            .fetch_one(&self.pool)
            .await?;
        let position = GlobalPosition::new(position);
        self.advance_head(position);
        Ok(position)
    }

    fn subscribe(&self, from: GlobalPosition, filter: EventFilter) -> EventSubscription {
        EventSubscription::spawn(
            self.clone(),
            from,
            filter,
            self.head.subscribe(),
            self.options.clone(),
        )
    }

    fn observe_head(&self, position: GlobalPosition) {
        self.advance_head(position);
    }
}
