//! Versioned events and their envelope.
//!
//! Every event belongs to exactly one aggregate stream and carries the
//! version it occupies there. Attribution is optional: system commands
//! (matching timeouts, failures, dispute resolution) record no user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::repository::StoredEvent;

/// Envelope fields shared by every event in a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Type name, e.g. `trip.driver_matched`.
    pub event_type: String,
    /// The stream this event belongs to.
    pub aggregate_id: Uuid,
    /// Position within the stream, starting at 1.
    pub version: i64,
    /// The user the event is attributed to; `None` for system events.
    pub user_id: Option<String>,
    /// Correlation ID of the command that produced the event.
    pub correlation_id: Uuid,
    /// When the event was recorded. Informational only; order is by version.
    pub occurred_at: DateTime<Utc>,
}

impl EventMetadata {
    /// Metadata for a new event with a fresh `event_id`.
    #[must_use]
    pub fn record(
        event_type: &str,
        aggregate_id: Uuid,
        version: i64,
        user_id: Option<&str>,
        correlation_id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.to_owned(),
            aggregate_id,
            version,
            user_id: user_id.map(str::to_owned),
            correlation_id,
            occurred_at,
        }
    }

    /// `true` when no user is attributed.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.user_id.is_none()
    }
}

impl From<&StoredEvent> for EventMetadata {
    fn from(stored: &StoredEvent) -> Self {
        Self {
            event_id: stored.event_id,
            event_type: stored.event_type.clone(),
            aggregate_id: stored.aggregate_id,
            version: stored.version,
            user_id: stored.user_id.clone(),
            correlation_id: stored.correlation_id,
            occurred_at: stored.occurred_at,
        }
    }
}

/// An event that can be written to an event stream.
pub trait DomainEvent: Send + Sync + std::fmt::Debug {
    /// Type name used to route the payload on decode.
    fn event_type(&self) -> &'static str;

    /// Serializes the payload to JSON.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the payload cannot be
    /// represented as JSON.
    fn to_payload(&self) -> Result<serde_json::Value, DomainError>;

    /// The envelope.
    fn metadata(&self) -> &EventMetadata;

    /// Stream position.
    fn version(&self) -> i64 {
        self.metadata().version
    }

    /// Converts to the storage representation.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if payload serialization fails;
    /// nothing should be written in that case.
    fn to_stored(&self) -> Result<StoredEvent, DomainError> {
        let meta = self.metadata();
        Ok(StoredEvent {
            event_id: meta.event_id,
            aggregate_id: meta.aggregate_id,
            event_type: self.event_type().to_owned(),
            payload: self.to_payload()?,
            version: meta.version,
            user_id: meta.user_id.clone(),
            correlation_id: meta.correlation_id,
            occurred_at: meta.occurred_at,
        })
    }
}
