//! `PostgreSQL` implementation of the `EventRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use tripflow_core::error::DomainError;
use tripflow_core::repository::{EventRepository, StoredEvent, validate_batch};

/// PostgreSQL-backed event repository.
#[derive(Debug, Clone)]
pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    /// Creates a new `PgEventRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_version(&self, trip_id: Uuid) -> Result<i64, DomainError> {
        let (version,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM trip_events WHERE trip_id = $1")
                .bind(trip_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("current_version", &e))?;
        Ok(version)
    }
}

#[derive(Debug, FromRow)]
struct TripEventRow {
    event_id: Uuid,
    trip_id: Uuid,
    event_type: String,
    payload: serde_json::Value,
    version: i64,
    user_id: Option<String>,
    correlation_id: Uuid,
    occurred_at: DateTime<Utc>,
}

impl From<TripEventRow> for StoredEvent {
    fn from(row: TripEventRow) -> Self {
        Self {
            event_id: row.event_id,
            aggregate_id: row.trip_id,
            event_type: row.event_type,
            payload: row.payload,
            version: row.version,
            user_id: row.user_id,
            correlation_id: row.correlation_id,
            occurred_at: row.occurred_at,
        }
    }
}

const SELECT_EVENTS: &str = r"
    SELECT event_id, trip_id, event_type, payload, version, user_id, correlation_id, occurred_at
    FROM trip_events
    WHERE trip_id = $1 AND version > $2
    ORDER BY version ASC
";

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn get_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        self.get_events_after_version(aggregate_id, 0).await
    }

    #[instrument(skip(self), err)]
    async fn get_events_after_version(
        &self,
        aggregate_id: Uuid,
        version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let rows: Vec<TripEventRow> = sqlx::query_as(SELECT_EVENTS)
            .bind(aggregate_id)
            .bind(version)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_events", &e))?;
        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }

    #[instrument(skip(self, events), fields(event_count = events.len()), err)]
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }
        validate_batch(aggregate_id, expected_version, events)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", &e))?;

        let actual = stream_version(&mut tx, aggregate_id).await?;
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }

        for event in events {
            let inserted = sqlx::query(
                r"
                INSERT INTO trip_events
                    (event_id, trip_id, event_type, payload, version, user_id, correlation_id, occurred_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ",
            )
            .bind(event.event_id)
            .bind(aggregate_id)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(event.version)
            .bind(event.user_id.as_deref())
            .bind(event.correlation_id)
            .bind(event.occurred_at)
            .execute(&mut *tx)
            .await;

            if let Err(e) = inserted {
                if is_unique_violation(&e) {
                    // The transaction is already aborted; dropping it rolls back.
                    drop(tx);
                    let actual = self.current_version(aggregate_id).await?;
                    return Err(DomainError::ConcurrencyConflict {
                        aggregate_id,
                        expected: expected_version,
                        actual,
                    });
                }
                return Err(map_sqlx_error("insert_event", &e));
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", &e))?;
        debug!(%aggregate_id, count = events.len(), "events appended");
        Ok(())
    }
}

async fn stream_version(
    tx: &mut Transaction<'_, Postgres>,
    trip_id: Uuid,
) -> Result<i64, DomainError> {
    let (version,): (i64,) =
        sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM trip_events WHERE trip_id = $1")
            .bind(trip_id)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("stream_version", &e))?;
    Ok(version)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

fn map_sqlx_error(operation: &str, err: &sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("event store {operation} failed: {err}"))
}
