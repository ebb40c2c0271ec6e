//! Event repository abstraction.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DomainError;

/// Stored representation of a domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// Event type name for deserialization routing.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Version within the aggregate stream. The first event is version 1.
    pub version: i64,
    /// Attribution; `None` for system-generated events.
    pub user_id: Option<String>,
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Timestamp of event creation. Never used for ordering.
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}

/// Repository trait for loading and appending domain events.
///
/// Streams are append-only. The repository, not the caller, is the authority
/// on the current stream version: every append must continue the stream at
/// exactly `current_max + 1`, otherwise it fails with
/// `DomainError::ConcurrencyConflict` and nothing is written.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Load all events for a given aggregate, ordered by version.
    async fn get_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError>;

    /// Load the events with a version strictly greater than `version`,
    /// ordered by version.
    async fn get_events_after_version(
        &self,
        aggregate_id: Uuid,
        version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError>;

    /// Append new events to an aggregate stream with optimistic concurrency.
    /// `expected_version` is the last known version; the events must carry
    /// consecutive versions starting at `expected_version + 1`. The batch is
    /// written atomically.
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError>;

    /// Append a single event. Its version must be `current_max + 1`; a
    /// version below 1 is rejected without touching the store.
    async fn save_event(&self, event: &StoredEvent) -> Result<(), DomainError> {
        let expected_version = event
            .version
            .checked_sub(1)
            .filter(|v| *v >= 0)
            .ok_or_else(|| {
                DomainError::Validation(format!(
                    "event {} has version {}; versions start at 1",
                    event.event_id, event.version
                ))
            })?;
        self.append_events(
            event.aggregate_id,
            expected_version,
            std::slice::from_ref(event),
        )
        .await
    }
}

/// Checks that `events` belong to `aggregate_id` and carry consecutive
/// versions starting right after `expected_version`.
///
/// # Errors
///
/// Returns `DomainError::Validation` for a malformed batch.
pub fn validate_batch(
    aggregate_id: Uuid,
    expected_version: i64,
    events: &[StoredEvent],
) -> Result<(), DomainError> {
    for (offset, event) in (1_i64..).zip(events) {
        if event.aggregate_id != aggregate_id {
            return Err(DomainError::Validation(format!(
                "event {} targets aggregate {}, expected {aggregate_id}",
                event.event_id, event.aggregate_id
            )));
        }
        if event.version != expected_version + offset {
            return Err(DomainError::Validation(format!(
                "event {} has version {}, expected {}",
                event.event_id,
                event.version,
                expected_version + offset
            )));
        }
    }
    Ok(())
}
