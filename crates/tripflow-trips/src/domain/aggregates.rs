//! Aggregate root for the Trip Lifecycle context.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tripflow_core::aggregate::AggregateRoot;
use tripflow_core::error::DomainError;
use uuid::Uuid;

use super::events::{TripEvent, TripEventKind};
use super::location::GeoPoint;
use super::ports::VehicleType;
use super::states::TripState;

/// Which side of the trip a user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    /// The passenger.
    Rider,
    /// The assigned driver.
    Driver,
}

impl PartyRole {
    /// Persistent name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rider => "rider",
            Self::Driver => "driver",
        }
    }
}

/// Current folded state of one trip.
///
/// Never edited directly: every field is the result of applying the trip's
/// events in version order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripAggregate {
    /// Aggregate identifier.
    pub id: Uuid,
    /// The rider who requested the trip.
    pub rider_id: String,
    /// Assigned driver, set on match.
    pub driver_id: Option<String>,
    /// Assigned vehicle, set on match.
    pub vehicle_id: Option<String>,
    /// Requested vehicle class.
    pub vehicle_type: VehicleType,
    /// Pickup point.
    pub pickup_location: GeoPoint,
    /// Drop-off point.
    pub destination_location: GeoPoint,
    /// Latest reported position.
    pub current_location: Option<GeoPoint>,
    /// Lifecycle state.
    pub state: TripState,
    /// When the trip was requested.
    pub requested_at: DateTime<Utc>,
    /// When a driver was matched.
    pub matched_at: Option<DateTime<Utc>>,
    /// When the rider was picked up.
    pub started_at: Option<DateTime<Utc>>,
    /// When the trip completed.
    pub completed_at: Option<DateTime<Utc>>,
    /// When the trip was cancelled.
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Quoted fare.
    pub estimated_fare: f64,
    /// Final fare.
    pub actual_fare: Option<f64>,
    /// Estimated distance until completion, driven distance afterwards.
    pub distance_km: f64,
    /// Estimated ride time in seconds.
    pub estimated_duration_seconds: i64,
    /// Actual ride time in seconds.
    pub duration_seconds: Option<i64>,
    /// Driver ETA to pickup at match time.
    pub driver_eta_seconds: Option<i64>,
    /// Fare currency.
    pub currency: String,
    /// Surge factor in the quote.
    pub surge_multiplier: f64,
    /// Number of events applied.
    pub version: i64,
    /// Timestamp of the last applied event.
    pub last_updated: DateTime<Utc>,
    /// Auxiliary attribution (cancellation reason, actor ids).
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl TripAggregate {
    /// An empty aggregate at version 0, before its `TripRequested` event.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            rider_id: String::new(),
            driver_id: None,
            vehicle_id: None,
            vehicle_type: VehicleType::default(),
            pickup_location: GeoPoint::default(),
            destination_location: GeoPoint::default(),
            current_location: None,
            state: TripState::Requested,
            requested_at: DateTime::<Utc>::default(),
            matched_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            estimated_fare: 0.0,
            actual_fare: None,
            distance_km: 0.0,
            estimated_duration_seconds: 0,
            duration_seconds: None,
            driver_eta_seconds: None,
            currency: String::new(),
            surge_multiplier: 1.0,
            version: 0,
            last_updated: DateTime::<Utc>::default(),
            metadata: BTreeMap::new(),
        }
    }

    /// Folds `events` (in version order) over an empty aggregate.
    #[must_use]
    pub fn fold<'a>(id: Uuid, events: impl IntoIterator<Item = &'a TripEvent>) -> Self {
        let mut trip = Self::new(id);
        trip.apply_all(events);
        trip
    }

    /// The role `user_id` plays on this trip, if any.
    #[must_use]
    pub fn party_role(&self, user_id: &str) -> Option<PartyRole> {
        if self.rider_id == user_id {
            Some(PartyRole::Rider)
        } else if self.driver_id.as_deref() == Some(user_id) {
            Some(PartyRole::Driver)
        } else {
            None
        }
    }

    /// Requires `user_id` to be the rider or the driver.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Unauthorized` otherwise.
    pub fn ensure_party(&self, user_id: &str) -> Result<PartyRole, DomainError> {
        self.party_role(user_id).ok_or_else(|| {
            DomainError::Unauthorized(format!(
                "user {user_id} is neither rider nor driver of trip {}",
                self.id
            ))
        })
    }

    /// Requires `driver_id` to be the assigned driver.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Unauthorized` if no driver is assigned or a
    /// different driver is.
    pub fn ensure_driver(&self, driver_id: &str) -> Result<(), DomainError> {
        match self.driver_id.as_deref() {
            Some(assigned) if assigned == driver_id => Ok(()),
            Some(_) => Err(DomainError::Unauthorized(format!(
                "driver {driver_id} is not assigned to trip {}",
                self.id
            ))),
            None => Err(DomainError::Unauthorized(format!(
                "trip {} has no assigned driver",
                self.id
            ))),
        }
    }

    fn note(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key.to_owned(), value.into());
    }
}

impl AggregateRoot for TripAggregate {
    type Event = TripEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        let at = event.metadata.occurred_at;
        match &event.kind {
            TripEventKind::TripRequested(payload) => {
                self.rider_id.clone_from(&payload.rider_id);
                self.pickup_location = payload.pickup;
                self.destination_location = payload.destination;
                self.vehicle_type = payload.vehicle_type;
                self.estimated_fare = payload.estimated_fare;
                self.distance_km = payload.distance_km;
                self.estimated_duration_seconds = payload.estimated_duration_seconds;
                self.currency.clone_from(&payload.currency);
                self.surge_multiplier = payload.surge_multiplier;
                self.state = TripState::Requested;
                self.requested_at = at;
            }
            TripEventKind::MatchingStarted(_) => {
                self.state = TripState::Matching;
            }
            TripEventKind::DriverMatched(payload) => {
                self.driver_id = Some(payload.driver_id.clone());
                self.vehicle_id = Some(payload.vehicle_id.clone());
                self.driver_eta_seconds = Some(payload.eta_seconds);
                if let Some(fare) = payload.fare {
                    self.estimated_fare = fare;
                }
                self.state = TripState::Matched;
                self.matched_at.get_or_insert(at);
            }
            TripEventKind::DriverEnRoute(_) => {
                self.state = TripState::DriverEnRoute;
            }
            TripEventKind::DriverArrived(_) => {
                self.state = TripState::DriverArrived;
            }
            TripEventKind::TripStarted(_) => {
                self.state = TripState::Started;
                self.started_at.get_or_insert(at);
            }
            TripEventKind::TripInProgress(_) => {
                self.state = TripState::InProgress;
            }
            TripEventKind::TripCompleted(payload) => {
                self.actual_fare = Some(payload.actual_fare);
                self.distance_km = payload.distance_km;
                self.duration_seconds = Some(payload.duration_seconds);
                self.state = TripState::Completed;
                self.completed_at.get_or_insert(at);
            }
            TripEventKind::TripCancelled(payload) => {
                self.state = TripState::Cancelled;
                self.cancelled_at.get_or_insert(at);
                self.note("reason", payload.reason.as_str());
                self.note("cancelled_by", payload.cancelled_by.as_str());
                self.note("cancelled_by_role", payload.role.as_str());
            }
            TripEventKind::TripFailed(payload) => {
                self.state = TripState::Failed;
                self.note("failure_reason", payload.reason.as_str());
            }
            TripEventKind::TripDisputed(payload) => {
                self.state = TripState::Disputed;
                self.note("dispute_reason", payload.reason.as_str());
                self.note("disputed_by", payload.raised_by.as_str());
            }
            TripEventKind::DisputeResolved(payload) => {
                if let Some(fare) = payload.adjusted_fare {
                    self.actual_fare = Some(fare);
                }
                self.state = TripState::Completed;
                self.note("dispute_resolution", payload.resolution.as_str());
            }
            TripEventKind::LocationUpdated(payload) => {
                self.current_location = Some(payload.location);
                self.note("location_updated_by", payload.role.as_str());
            }
        }
        self.version += 1;
        self.last_updated = at;
    }
}
