//! Domain events for the Trip Lifecycle context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tripflow_core::error::DomainError;
use tripflow_core::event::{DomainEvent, EventMetadata};
use tripflow_core::repository::StoredEvent;
use uuid::Uuid;

use super::aggregates::PartyRole;
use super::location::GeoPoint;
use super::ports::VehicleType;

/// Emitted when a rider requests a trip. Creates the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRequested {
    /// The requesting rider.
    pub rider_id: String,
    /// Pickup point.
    pub pickup: GeoPoint,
    /// Drop-off point.
    pub destination: GeoPoint,
    /// Requested vehicle class.
    pub vehicle_type: VehicleType,
    /// Quoted fare.
    pub estimated_fare: f64,
    /// Estimated trip distance in kilometers.
    pub distance_km: f64,
    /// Estimated trip duration in seconds.
    pub estimated_duration_seconds: i64,
    /// Fare currency.
    pub currency: String,
    /// Surge factor in the quote.
    pub surge_multiplier: f64,
}

/// Emitted when dispatch starts searching for a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingStarted {}

/// Emitted when a driver accepts the trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverMatched {
    /// The matched driver.
    pub driver_id: String,
    /// The driver's vehicle.
    pub vehicle_id: String,
    /// Driver's ETA to the pickup point in seconds.
    pub eta_seconds: i64,
    /// Fare agreed at match time, replacing the estimate when present.
    pub fare: Option<f64>,
}

/// Emitted when the driver sets off to the pickup point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverEnRoute {
    /// The driver.
    pub driver_id: String,
}

/// Emitted when the driver reaches the pickup point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverArrived {
    /// The driver.
    pub driver_id: String,
}

/// Emitted when the rider is picked up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripStarted {
    /// The driver.
    pub driver_id: String,
}

/// Emitted right after [`TripStarted`] once the ride is under way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripInProgress {}

/// Emitted when the rider is dropped off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripCompleted {
    /// Final fare.
    pub actual_fare: f64,
    /// Driven distance in kilometers.
    pub distance_km: f64,
    /// Ride duration in seconds.
    pub duration_seconds: i64,
}

/// Emitted when the rider or driver cancels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripCancelled {
    /// The user who cancelled.
    pub cancelled_by: String,
    /// Whether that user is the rider or the driver.
    pub role: PartyRole,
    /// Free-text reason.
    pub reason: String,
}

/// Emitted when the trip cannot be fulfilled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripFailed {
    /// Why the trip failed.
    pub reason: String,
}

/// Emitted when a party disputes a completed trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripDisputed {
    /// The user raising the dispute.
    pub raised_by: String,
    /// Whether that user is the rider or the driver.
    pub role: PartyRole,
    /// Free-text reason.
    pub reason: String,
}

/// Emitted when a dispute is settled and the trip returns to completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisputeResolved {
    /// Outcome description.
    pub resolution: String,
    /// Corrected fare, if the resolution changed it.
    pub adjusted_fare: Option<f64>,
}

/// Emitted for each position report from the rider or driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdated {
    /// Reported position.
    pub location: GeoPoint,
    /// The reporting user.
    pub updated_by: String,
    /// Whether that user is the rider or the driver.
    pub role: PartyRole,
}

/// Event type identifier for [`TripRequested`].
pub const TRIP_REQUESTED_EVENT_TYPE: &str = "trip.requested";

/// Event type identifier for [`MatchingStarted`].
pub const MATCHING_STARTED_EVENT_TYPE: &str = "trip.matching_started";

/// Event type identifier for [`DriverMatched`].
pub const DRIVER_MATCHED_EVENT_TYPE: &str = "trip.driver_matched";

/// Event type identifier for [`DriverEnRoute`].
pub const DRIVER_EN_ROUTE_EVENT_TYPE: &str = "trip.driver_en_route";

/// Event type identifier for [`DriverArrived`].
pub const DRIVER_ARRIVED_EVENT_TYPE: &str = "trip.driver_arrived";

/// Event type identifier for [`TripStarted`].
pub const TRIP_STARTED_EVENT_TYPE: &str = "trip.started";

/// Event type identifier for [`TripInProgress`].
pub const TRIP_IN_PROGRESS_EVENT_TYPE: &str = "trip.in_progress";

/// Event type identifier for [`TripCompleted`].
pub const TRIP_COMPLETED_EVENT_TYPE: &str = "trip.completed";

/// Event type identifier for [`TripCancelled`].
pub const TRIP_CANCELLED_EVENT_TYPE: &str = "trip.cancelled";

/// Event type identifier for [`TripFailed`].
pub const TRIP_FAILED_EVENT_TYPE: &str = "trip.failed";

/// Event type identifier for [`TripDisputed`].
pub const TRIP_DISPUTED_EVENT_TYPE: &str = "trip.disputed";

/// Event type identifier for [`DisputeResolved`].
pub const DISPUTE_RESOLVED_EVENT_TYPE: &str = "trip.dispute_resolved";

/// Event type identifier for [`LocationUpdated`].
pub const LOCATION_UPDATED_EVENT_TYPE: &str = "trip.location_updated";

/// Event payload variants for the Trip Lifecycle context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TripEventKind {
    /// A trip was requested.
    TripRequested(TripRequested),
    /// Driver search began.
    MatchingStarted(MatchingStarted),
    /// A driver accepted.
    DriverMatched(DriverMatched),
    /// The driver is on the way.
    DriverEnRoute(DriverEnRoute),
    /// The driver is at the pickup point.
    DriverArrived(DriverArrived),
    /// The rider was picked up.
    TripStarted(TripStarted),
    /// The ride is under way.
    TripInProgress(TripInProgress),
    /// The ride ended.
    TripCompleted(TripCompleted),
    /// The trip was cancelled.
    TripCancelled(TripCancelled),
    /// The trip failed.
    TripFailed(TripFailed),
    /// The trip was disputed.
    TripDisputed(TripDisputed),
    /// The dispute was resolved.
    DisputeResolved(DisputeResolved),
    /// A position report.
    LocationUpdated(LocationUpdated),
}

impl TripEventKind {
    /// The wire name of this event type.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::TripRequested(_) => TRIP_REQUESTED_EVENT_TYPE,
            Self::MatchingStarted(_) => MATCHING_STARTED_EVENT_TYPE,
            Self::DriverMatched(_) => DRIVER_MATCHED_EVENT_TYPE,
            Self::DriverEnRoute(_) => DRIVER_EN_ROUTE_EVENT_TYPE,
            Self::DriverArrived(_) => DRIVER_ARRIVED_EVENT_TYPE,
            Self::TripStarted(_) => TRIP_STARTED_EVENT_TYPE,
            Self::TripInProgress(_) => TRIP_IN_PROGRESS_EVENT_TYPE,
            Self::TripCompleted(_) => TRIP_COMPLETED_EVENT_TYPE,
            Self::TripCancelled(_) => TRIP_CANCELLED_EVENT_TYPE,
            Self::TripFailed(_) => TRIP_FAILED_EVENT_TYPE,
            Self::TripDisputed(_) => TRIP_DISPUTED_EVENT_TYPE,
            Self::DisputeResolved(_) => DISPUTE_RESOLVED_EVENT_TYPE,
            Self::LocationUpdated(_) => LOCATION_UPDATED_EVENT_TYPE,
        }
    }
}

/// Domain event envelope for the Trip Lifecycle context.
#[derive(Debug, Clone, PartialEq)]
pub struct TripEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: TripEventKind,
}

impl TripEvent {
    /// Builds a new event at `version` for `trip_id`.
    #[must_use]
    pub fn new(
        trip_id: Uuid,
        version: i64,
        user_id: Option<&str>,
        correlation_id: Uuid,
        occurred_at: DateTime<Utc>,
        kind: TripEventKind,
    ) -> Self {
        Self {
            metadata: EventMetadata::record(
                kind.event_type(),
                trip_id,
                version,
                user_id,
                correlation_id,
                occurred_at,
            ),
            kind,
        }
    }

    /// Rebuilds an event from its storage representation.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the payload does not decode.
    pub fn from_stored(stored: &StoredEvent) -> Result<Self, DomainError> {
        let kind: TripEventKind = serde_json::from_value(stored.payload.clone()).map_err(|e| {
            DomainError::Infrastructure(format!(
                "event {} deserialization failed: {e}",
                stored.event_id
            ))
        })?;
        Ok(Self {
            metadata: EventMetadata::from(stored),
            kind,
        })
    }
}

impl DomainEvent for TripEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn to_payload(&self) -> Result<serde_json::Value, DomainError> {
        serde_json::to_value(&self.kind).map_err(|e| {
            DomainError::Infrastructure(format!("event payload serialization failed: {e}"))
        })
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
