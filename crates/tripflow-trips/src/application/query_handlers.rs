//! Query handlers for the Trip Lifecycle context.
//!
//! Reads are served from the read model. A trip missing from the read model
//! is replayed from the event store and written back.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use tripflow_core::error::DomainError;
use tripflow_core::repository::{EventRepository, StoredEvent};
use uuid::Uuid;

use super::command_handlers::reconstitute;
use super::read_model::TripReadModel;
use crate::domain::aggregates::TripAggregate;

/// Largest page a listing may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Read-only view of one stored event.
#[derive(Debug, Clone, Serialize)]
pub struct TripEventView {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Event type name.
    pub event_type: String,
    /// Position in the trip's stream.
    pub version: i64,
    /// Attribution, `None` for system events.
    pub user_id: Option<String>,
    /// Correlation ID of the originating command.
    pub correlation_id: Uuid,
    /// When the event was recorded.
    pub occurred_at: DateTime<Utc>,
    /// Event payload.
    pub data: serde_json::Value,
}

impl From<StoredEvent> for TripEventView {
    fn from(event: StoredEvent) -> Self {
        Self {
            event_id: event.event_id,
            event_type: event.event_type,
            version: event.version,
            user_id: event.user_id,
            correlation_id: event.correlation_id,
            occurred_at: event.occurred_at,
            data: event.payload,
        }
    }
}

/// Retrieves a trip by id.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the trip has no events.
pub async fn get_trip(
    trip_id: Uuid,
    read_model: &dyn TripReadModel,
    events: &dyn EventRepository,
) -> Result<TripAggregate, DomainError> {
    if let Some(trip) = read_model.get_trip(trip_id).await? {
        return Ok(trip);
    }
    let trip = reconstitute(trip_id, &events.get_events(trip_id).await?)?;
    if let Err(e) = read_model.save_trip(&trip).await {
        warn!(%trip_id, error = %e, "could not backfill read model");
    }
    Ok(trip)
}

/// A rider's trips, newest first.
///
/// # Errors
///
/// Returns `DomainError::Validation` if `limit` is outside `1..=100`.
pub async fn get_trips_by_rider(
    rider_id: &str,
    limit: u32,
    offset: u32,
    read_model: &dyn TripReadModel,
) -> Result<Vec<TripAggregate>, DomainError> {
    check_limit(limit)?;
    read_model.get_trips_by_rider(rider_id, limit, offset).await
}

/// A driver's trips, newest first.
///
/// # Errors
///
/// Returns `DomainError::Validation` if `limit` is outside `1..=100`.
pub async fn get_trips_by_driver(
    driver_id: &str,
    limit: u32,
    offset: u32,
    read_model: &dyn TripReadModel,
) -> Result<Vec<TripAggregate>, DomainError> {
    check_limit(limit)?;
    read_model.get_trips_by_driver(driver_id, limit, offset).await
}

/// Every trip in an active state.
///
/// # Errors
///
/// Propagates read model failures.
pub async fn get_active_trips(
    read_model: &dyn TripReadModel,
) -> Result<Vec<TripAggregate>, DomainError> {
    read_model.get_active_trips().await
}

/// The full event history of a trip, in version order.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the trip has no events.
pub async fn get_trip_events(
    trip_id: Uuid,
    events: &dyn EventRepository,
) -> Result<Vec<TripEventView>, DomainError> {
    let history = events.get_events(trip_id).await?;
    if history.is_empty() {
        return Err(DomainError::AggregateNotFound(trip_id));
    }
    Ok(history.into_iter().map(TripEventView::from).collect())
}

/// Replays a trip from the event store and overwrites its read model row.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the trip has no events.
pub async fn rebuild_trip(
    trip_id: Uuid,
    read_model: &dyn TripReadModel,
    events: &dyn EventRepository,
) -> Result<TripAggregate, DomainError> {
    let trip = reconstitute(trip_id, &events.get_events(trip_id).await?)?;
    read_model.replace_trip(&trip).await?;
    info!(%trip_id, version = trip.version, "read model rebuilt");
    Ok(trip)
}

fn check_limit(limit: u32) -> Result<(), DomainError> {
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(DomainError::Validation(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}, got {limit}"
        )));
    }
    Ok(())
}
