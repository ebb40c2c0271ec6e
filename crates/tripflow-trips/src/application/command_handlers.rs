//! Command handlers for the Trip Lifecycle context.
//!
//! Every command runs the same pipeline: load the aggregate, validate the
//! command against it, append the resulting events, fold them, refresh the
//! read model, and publish the changes to live subscribers. Commands on the
//! same trip are serialized in-process; version collisions with other
//! writers are retried from a fresh replay.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};
use tripflow_core::aggregate::AggregateRoot;
use tripflow_core::clock::Clock;
use tripflow_core::command::Command;
use tripflow_core::error::DomainError;
use tripflow_core::event::DomainEvent;
use tripflow_core::repository::{EventRepository, StoredEvent};
use uuid::Uuid;

use super::locks::KeyedLocks;
use super::read_model::TripReadModel;
use crate::domain::aggregates::TripAggregate;
use crate::domain::commands::{
    CancelTrip, CompleteTrip, DisputeTrip, FailTrip, MarkDriverArrived, MarkDriverEnRoute,
    MatchDriver, RequestTrip, ResolveDispute, StartMatching, StartTrip, UpdateLocation,
};
use crate::domain::events::{
    DisputeResolved, DriverArrived, DriverEnRoute, DriverMatched, LocationUpdated,
    MatchingStarted, TripCancelled, TripCompleted, TripDisputed, TripEvent, TripEventKind,
    TripFailed, TripInProgress, TripRequested, TripStarted,
};
use crate::domain::location::GeoPoint;
use crate::domain::ports::{GeoService, PriceQuote, PriceRequest, PricingService, VehicleType};
use crate::domain::states::{StateMachine, TripState};
use crate::realtime::{Subscription, SubscriptionHub, TripUpdateEvent};

/// Attempts per command before a version collision is surfaced.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Result of a successfully handled command.
#[derive(Debug, Clone)]
pub struct TripCommandResult {
    /// The trip after the command's events were applied.
    pub trip: TripAggregate,
    /// The stored events produced and persisted.
    pub stored_events: Vec<StoredEvent>,
}

/// Reconstitutes a trip from its stored events.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an empty history and
/// `DomainError::Infrastructure` if an event does not decode.
pub fn reconstitute(
    trip_id: Uuid,
    existing_events: &[StoredEvent],
) -> Result<TripAggregate, DomainError> {
    if existing_events.is_empty() {
        return Err(DomainError::AggregateNotFound(trip_id));
    }
    let events = existing_events
        .iter()
        .map(TripEvent::from_stored)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TripAggregate::fold(trip_id, &events))
}

/// Orchestrates trip commands over the event store, read model, and hub.
pub struct TripLifecycleService {
    events: Arc<dyn EventRepository>,
    read_model: Arc<dyn TripReadModel>,
    geo: Arc<dyn GeoService>,
    pricing: Arc<dyn PricingService>,
    hub: SubscriptionHub,
    clock: Arc<dyn Clock>,
    trip_locks: KeyedLocks<Uuid>,
    party_locks: KeyedLocks<String>,
    max_attempts: u32,
}

impl std::fmt::Debug for TripLifecycleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TripLifecycleService")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl TripLifecycleService {
    /// Wires the service to its collaborators.
    #[must_use]
    pub fn new(
        events: Arc<dyn EventRepository>,
        read_model: Arc<dyn TripReadModel>,
        geo: Arc<dyn GeoService>,
        pricing: Arc<dyn PricingService>,
        hub: SubscriptionHub,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            events,
            read_model,
            geo,
            pricing,
            hub,
            clock,
            trip_locks: KeyedLocks::new(),
            party_locks: KeyedLocks::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets how many times a command is attempted on version collisions.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// The hub this service publishes to.
    #[must_use]
    pub fn hub(&self) -> &SubscriptionHub {
        &self.hub
    }

    /// Handles `RequestTrip`: checks the rider is free, quotes the trip, and
    /// creates it at version 1.
    ///
    /// # Errors
    ///
    /// `Validation` for bad input, `Conflict` if the rider already has an
    /// active trip, `Dependency` if geo or pricing fails.
    #[instrument(skip(self, command), fields(rider_id = %command.rider_id, correlation_id = %command.correlation_id))]
    pub async fn request_trip(
        &self,
        command: &RequestTrip,
    ) -> Result<TripCommandResult, DomainError> {
        require_non_empty("rider_id", &command.rider_id)?;
        command.pickup.validate()?;
        command.destination.validate()?;

        let _rider = self.party_locks.lock(rider_key(&command.rider_id)).await;
        if let Some(active) = self
            .read_model
            .find_active_trip_for_rider(&command.rider_id)
            .await?
        {
            return Err(DomainError::Conflict(format!(
                "rider {} already has active trip {}",
                command.rider_id, active.id
            )));
        }

        let distance = self
            .geo
            .calculate_distance(command.pickup, command.destination)
            .await
            .map_err(|e| dependency("geo distance", &e))?;
        let eta = self
            .geo
            .calculate_eta(command.pickup, command.destination, command.vehicle_type)
            .await
            .map_err(|e| dependency("geo eta", &e))?;
        let distance_km = distance.distance_meters / 1000.0;
        let quote = self
            .quote(
                distance_km,
                eta.duration_seconds,
                command.vehicle_type,
                command.pickup,
            )
            .await?;

        let trip_id = Uuid::new_v4();
        let result = self
            .commit(
                TripAggregate::new(trip_id),
                command,
                vec![TripEventKind::TripRequested(TripRequested {
                    rider_id: command.rider_id.clone(),
                    pickup: command.pickup,
                    destination: command.destination,
                    vehicle_type: command.vehicle_type,
                    estimated_fare: quote.total_fare,
                    distance_km,
                    estimated_duration_seconds: eta.duration_seconds,
                    currency: quote.currency,
                    surge_multiplier: quote.surge_multiplier,
                })],
            )
            .await?;

        info!(%trip_id, estimated_fare = quote.total_fare, "trip requested");
        Ok(result)
    }

    /// Handles `StartMatching`: Requested to Matching.
    ///
    /// # Errors
    ///
    /// `AggregateNotFound` or `InvalidTransition`.
    #[instrument(skip(self, command), fields(trip_id = %command.trip_id, correlation_id = %command.correlation_id))]
    pub async fn start_matching(
        &self,
        command: &StartMatching,
    ) -> Result<TripCommandResult, DomainError> {
        self.run(command.trip_id, command, |trip| {
            StateMachine::ensure_transition(trip.state, TripState::Matching)?;
            Ok(vec![TripEventKind::MatchingStarted(MatchingStarted {})])
        })
        .await
    }

    /// Handles `MatchDriver`. A trip still in Requested may be matched
    /// directly.
    ///
    /// # Errors
    ///
    /// `Validation`, `AggregateNotFound`, `Conflict` if the driver is busy
    /// on another trip, or `InvalidTransition`.
    #[instrument(skip(self, command), fields(trip_id = %command.trip_id, driver_id = %command.driver_id, correlation_id = %command.correlation_id))]
    pub async fn match_driver(
        &self,
        command: &MatchDriver,
    ) -> Result<TripCommandResult, DomainError> {
        require_non_empty("driver_id", &command.driver_id)?;
        require_non_empty("vehicle_id", &command.vehicle_id)?;
        if command.eta_seconds < 0 {
            return Err(DomainError::Validation(format!(
                "eta_seconds must not be negative, got {}",
                command.eta_seconds
            )));
        }
        if let Some(fare) = command.fare {
            require_amount("fare", fare)?;
        }

        let _trip = self.trip_locks.lock(command.trip_id).await;
        let _driver = self.party_locks.lock(driver_key(&command.driver_id)).await;
        if let Some(active) = self
            .read_model
            .find_active_trip_for_driver(&command.driver_id)
            .await?
        {
            if active.id != command.trip_id {
                return Err(DomainError::Conflict(format!(
                    "driver {} is busy on trip {}",
                    command.driver_id, active.id
                )));
            }
        }

        let result = self
            .execute(command.trip_id, command, |trip| {
                StateMachine::ensure_advance(trip.state, TripState::Matched)?;
                Ok(vec![TripEventKind::DriverMatched(DriverMatched {
                    driver_id: command.driver_id.clone(),
                    vehicle_id: command.vehicle_id.clone(),
                    eta_seconds: command.eta_seconds,
                    fare: command.fare,
                })])
            })
            .await?;
        info!("driver matched");
        Ok(result)
    }

    /// Handles `MarkDriverEnRoute`.
    ///
    /// # Errors
    ///
    /// `AggregateNotFound`, `Unauthorized` for anyone but the assigned
    /// driver, or `InvalidTransition`.
    #[instrument(skip(self, command), fields(trip_id = %command.trip_id, correlation_id = %command.correlation_id))]
    pub async fn mark_driver_en_route(
        &self,
        command: &MarkDriverEnRoute,
    ) -> Result<TripCommandResult, DomainError> {
        self.run(command.trip_id, command, |trip| {
            trip.ensure_driver(&command.driver_id)?;
            StateMachine::ensure_transition(trip.state, TripState::DriverEnRoute)?;
            Ok(vec![TripEventKind::DriverEnRoute(DriverEnRoute {
                driver_id: command.driver_id.clone(),
            })])
        })
        .await
    }

    /// Handles `MarkDriverArrived`. The en-route step may be skipped.
    ///
    /// # Errors
    ///
    /// `AggregateNotFound`, `Unauthorized`, or `InvalidTransition`.
    #[instrument(skip(self, command), fields(trip_id = %command.trip_id, correlation_id = %command.correlation_id))]
    pub async fn mark_driver_arrived(
        &self,
        command: &MarkDriverArrived,
    ) -> Result<TripCommandResult, DomainError> {
        self.run(command.trip_id, command, |trip| {
            trip.ensure_driver(&command.driver_id)?;
            StateMachine::ensure_advance(trip.state, TripState::DriverArrived)?;
            Ok(vec![TripEventKind::DriverArrived(DriverArrived {
                driver_id: command.driver_id.clone(),
            })])
        })
        .await
    }

    /// Handles `StartTrip`: emits `TripStarted` then `TripInProgress`.
    ///
    /// # Errors
    ///
    /// `AggregateNotFound`, `Unauthorized`, or `InvalidTransition`.
    #[instrument(skip(self, command), fields(trip_id = %command.trip_id, correlation_id = %command.correlation_id))]
    pub async fn start_trip(&self, command: &StartTrip) -> Result<TripCommandResult, DomainError> {
        let result = self
            .run(command.trip_id, command, |trip| {
                trip.ensure_driver(&command.driver_id)?;
                StateMachine::ensure_advance(trip.state, TripState::Started)?;
                Ok(vec![
                    TripEventKind::TripStarted(TripStarted {
                        driver_id: command.driver_id.clone(),
                    }),
                    TripEventKind::TripInProgress(TripInProgress {}),
                ])
            })
            .await?;
        info!("trip started");
        Ok(result)
    }

    /// Handles `CompleteTrip`. Without an explicit fare the trip is priced
    /// from the final distance and duration.
    ///
    /// # Errors
    ///
    /// `Validation`, `AggregateNotFound`, `Unauthorized`,
    /// `InvalidTransition`, or `Dependency` if pricing fails.
    #[instrument(skip(self, command), fields(trip_id = %command.trip_id, correlation_id = %command.correlation_id))]
    pub async fn complete_trip(
        &self,
        command: &CompleteTrip,
    ) -> Result<TripCommandResult, DomainError> {
        require_amount("distance_km", command.distance_km)?;
        if command.duration_seconds < 0 {
            return Err(DomainError::Validation(format!(
                "duration_seconds must not be negative, got {}",
                command.duration_seconds
            )));
        }
        if let Some(fare) = command.actual_fare {
            require_amount("actual_fare", fare)?;
        }

        let _trip = self.trip_locks.lock(command.trip_id).await;
        let validate = |trip: &TripAggregate| -> Result<(), DomainError> {
            trip.ensure_driver(&command.driver_id)?;
            StateMachine::ensure_transition(trip.state, TripState::Completed)
        };

        let actual_fare = match command.actual_fare {
            Some(fare) => fare,
            None => {
                let current = self.load(command.trip_id, false).await?;
                validate(&current)?;
                self.quote(
                    command.distance_km,
                    command.duration_seconds,
                    current.vehicle_type,
                    current.pickup_location,
                )
                .await?
                .total_fare
            }
        };

        let result = self
            .execute(command.trip_id, command, |trip| {
                validate(trip)?;
                Ok(vec![TripEventKind::TripCompleted(TripCompleted {
                    actual_fare,
                    distance_km: command.distance_km,
                    duration_seconds: command.duration_seconds,
                })])
            })
            .await?;
        info!(actual_fare, "trip completed");
        Ok(result)
    }

    /// Handles `CancelTrip`. The caller must be the rider or the driver;
    /// that is checked before the state.
    ///
    /// # Errors
    ///
    /// `AggregateNotFound`, `Unauthorized`, or `InvalidTransition`.
    #[instrument(skip(self, command), fields(trip_id = %command.trip_id, correlation_id = %command.correlation_id))]
    pub async fn cancel_trip(&self, command: &CancelTrip) -> Result<TripCommandResult, DomainError> {
        let result = self
            .run(command.trip_id, command, |trip| {
                let role = trip.ensure_party(&command.user_id)?;
                StateMachine::ensure_transition(trip.state, TripState::Cancelled)?;
                Ok(vec![TripEventKind::TripCancelled(TripCancelled {
                    cancelled_by: command.user_id.clone(),
                    role,
                    reason: command.reason.clone(),
                })])
            })
            .await?;
        info!(cancelled_by = %command.user_id, "trip cancelled");
        Ok(result)
    }

    /// Handles `FailTrip`, a system command without user attribution.
    ///
    /// # Errors
    ///
    /// `AggregateNotFound` or `InvalidTransition`.
    #[instrument(skip(self, command), fields(trip_id = %command.trip_id, correlation_id = %command.correlation_id))]
    pub async fn fail_trip(&self, command: &FailTrip) -> Result<TripCommandResult, DomainError> {
        let result = self
            .run(command.trip_id, command, |trip| {
                StateMachine::ensure_transition(trip.state, TripState::Failed)?;
                Ok(vec![TripEventKind::TripFailed(TripFailed {
                    reason: command.reason.clone(),
                })])
            })
            .await?;
        warn!(reason = %command.reason, "trip failed");
        Ok(result)
    }

    /// Handles `DisputeTrip` on a completed trip.
    ///
    /// # Errors
    ///
    /// `AggregateNotFound`, `Unauthorized`, or `InvalidTransition`.
    #[instrument(skip(self, command), fields(trip_id = %command.trip_id, correlation_id = %command.correlation_id))]
    pub async fn dispute_trip(
        &self,
        command: &DisputeTrip,
    ) -> Result<TripCommandResult, DomainError> {
        self.run(command.trip_id, command, |trip| {
            let role = trip.ensure_party(&command.user_id)?;
            StateMachine::ensure_transition(trip.state, TripState::Disputed)?;
            Ok(vec![TripEventKind::TripDisputed(TripDisputed {
                raised_by: command.user_id.clone(),
                role,
                reason: command.reason.clone(),
            })])
        })
        .await
    }

    /// Handles `ResolveDispute`: Disputed back to Completed, optionally
    /// overwriting the fare.
    ///
    /// # Errors
    ///
    /// `Validation`, `AggregateNotFound`, or `InvalidTransition` unless the
    /// trip is disputed.
    #[instrument(skip(self, command), fields(trip_id = %command.trip_id, correlation_id = %command.correlation_id))]
    pub async fn resolve_dispute(
        &self,
        command: &ResolveDispute,
    ) -> Result<TripCommandResult, DomainError> {
        if let Some(fare) = command.adjusted_fare {
            require_amount("adjusted_fare", fare)?;
        }
        self.run(command.trip_id, command, |trip| {
            if trip.state != TripState::Disputed {
                return Err(DomainError::InvalidTransition {
                    from: trip.state.to_string(),
                    to: TripState::Completed.to_string(),
                });
            }
            StateMachine::ensure_transition(trip.state, TripState::Completed)?;
            Ok(vec![TripEventKind::DisputeResolved(DisputeResolved {
                resolution: command.resolution.clone(),
                adjusted_fare: command.adjusted_fare,
            })])
        })
        .await
    }

    /// Handles `UpdateLocation`. Accepted only while a driver is attached
    /// and the trip is still live; the state does not change.
    ///
    /// # Errors
    ///
    /// `Validation`, `AggregateNotFound`, `Unauthorized`, or `Conflict` in
    /// any other state.
    #[instrument(skip(self, command), fields(trip_id = %command.trip_id, correlation_id = %command.correlation_id))]
    pub async fn update_location(
        &self,
        command: &UpdateLocation,
    ) -> Result<TripCommandResult, DomainError> {
        command.location.validate()?;
        self.run(command.trip_id, command, |trip| {
            let role = trip.ensure_party(&command.user_id)?;
            if !trip.state.is_post_match_active() {
                return Err(DomainError::Conflict(format!(
                    "trip {} does not accept location updates while {}",
                    trip.id, trip.state
                )));
            }
            Ok(vec![TripEventKind::LocationUpdated(LocationUpdated {
                location: command.location,
                updated_by: command.user_id.clone(),
                role,
            })])
        })
        .await
    }

    /// Opens a live update stream whose first message is the current
    /// snapshot.
    ///
    /// # Errors
    ///
    /// `AggregateNotFound` for an unknown trip.
    #[instrument(skip(self))]
    pub async fn subscribe_to_trip_updates(
        &self,
        trip_id: Uuid,
    ) -> Result<Subscription, DomainError> {
        // Holding the trip lock keeps commits from slipping in between the
        // snapshot and the registration.
        let _trip = self.trip_locks.lock(trip_id).await;
        let trip = self.load(trip_id, false).await?;
        let snapshot = TripUpdateEvent::snapshot(&trip)?;
        Ok(self.hub.subscribe(trip_id, snapshot))
    }

    async fn run<C, F>(
        &self,
        trip_id: Uuid,
        command: &C,
        decide: F,
    ) -> Result<TripCommandResult, DomainError>
    where
        C: Command,
        F: Fn(&TripAggregate) -> Result<Vec<TripEventKind>, DomainError> + Send + Sync,
    {
        let _trip = self.trip_locks.lock(trip_id).await;
        self.execute(trip_id, command, decide).await
    }

    /// Load, decide, commit; on a version collision start over from a full
    /// replay. Callers hold the trip lock.
    async fn execute<C, F>(
        &self,
        trip_id: Uuid,
        command: &C,
        decide: F,
    ) -> Result<TripCommandResult, DomainError>
    where
        C: Command,
        F: Fn(&TripAggregate) -> Result<Vec<TripEventKind>, DomainError> + Send + Sync,
    {
        let mut attempt = 1;
        loop {
            let current = self.load(trip_id, attempt > 1).await?;
            let kinds = decide(&current)?;
            match self.commit(current, command, kinds).await {
                Err(e) if e.is_concurrency_conflict() && attempt < self.max_attempts => {
                    metrics::counter!("trip_commands_retried_total").increment(1);
                    warn!(%trip_id, attempt, error = %e, "version conflict, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Current trip state. The read model row is caught up with any newer
    /// events; `fresh` skips the read model and replays everything.
    async fn load(&self, trip_id: Uuid, fresh: bool) -> Result<TripAggregate, DomainError> {
        if !fresh {
            match self.read_model.get_trip(trip_id).await {
                Ok(Some(mut cached)) => {
                    let tail = self
                        .events
                        .get_events_after_version(trip_id, cached.version)
                        .await?;
                    let tail = tail
                        .iter()
                        .map(TripEvent::from_stored)
                        .collect::<Result<Vec<_>, _>>()?;
                    cached.apply_all(&tail);
                    return Ok(cached);
                }
                Ok(None) => {}
                Err(e) => warn!(%trip_id, error = %e, "read model unavailable, replaying"),
            }
        }
        let history = self.events.get_events(trip_id).await?;
        reconstitute(trip_id, &history)
    }

    async fn commit<C: Command>(
        &self,
        current: TripAggregate,
        command: &C,
        kinds: Vec<TripEventKind>,
    ) -> Result<TripCommandResult, DomainError> {
        let trip_id = current.id;
        let base_version = current.version;
        let now = self.clock.now();
        if command.is_system() {
            info!(%trip_id, command = command.command_type(), "applying system command");
        }
        let events: Vec<TripEvent> = kinds
            .into_iter()
            .zip(current.next_version()..)
            .map(|(kind, version)| {
                TripEvent::new(
                    trip_id,
                    version,
                    command.actor_id(),
                    command.correlation_id(),
                    now,
                    kind,
                )
            })
            .collect();
        let stored_events = events
            .iter()
            .map(TripEvent::to_stored)
            .collect::<Result<Vec<_>, _>>()?;

        self.events
            .append_events(trip_id, base_version, &stored_events)
            .await?;
        metrics::counter!("trip_events_appended_total").increment(stored_events.len() as u64);

        let mut trip = current;
        let mut updates = Vec::with_capacity(events.len());
        for (event, stored) in events.iter().zip(&stored_events) {
            let old_status = trip.state;
            trip.apply(event);
            updates.push(TripUpdateEvent::delta(old_status, trip.state, stored));
        }

        if let Err(e) = self.read_model.save_trip(&trip).await {
            metrics::counter!("trip_projection_failures_total").increment(1);
            error!(%trip_id, version = trip.version, error = %e, "read model update failed");
        }
        for update in &updates {
            self.hub.publish(trip_id, update);
        }

        Ok(TripCommandResult {
            trip,
            stored_events,
        })
    }

    async fn quote(
        &self,
        distance_km: f64,
        duration_seconds: i64,
        vehicle_type: VehicleType,
        pickup_area: GeoPoint,
    ) -> Result<PriceQuote, DomainError> {
        #[allow(clippy::cast_precision_loss)]
        let estimated_minutes = duration_seconds as f64 / 60.0;
        self.pricing
            .calculate_price(&PriceRequest {
                distance_km,
                estimated_minutes,
                vehicle_type,
                pickup_area,
                request_time: self.clock.now(),
            })
            .await
            .map_err(|e| dependency("pricing", &e))
    }
}

fn rider_key(rider_id: &str) -> String {
    format!("rider:{rider_id}")
}

fn driver_key(driver_id: &str) -> String {
    format!("driver:{driver_id}")
}

fn dependency(collaborator: &str, error: &DomainError) -> DomainError {
    DomainError::Dependency(format!("{collaborator} failed: {error}"))
}

fn require_non_empty(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_amount(field: &str, value: f64) -> Result<(), DomainError> {
    if !value.is_finite() || value < 0.0 {
        return Err(DomainError::Validation(format!(
            "{field} must be a non-negative number, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tripflow_core::error::DomainError;
    use tripflow_core::repository::EventRepository;
    use tripflow_test_support::{
        ConflictingEventRepository, FailingEventRepository, FixedClock, InMemoryEventRepository,
        SteppingClock,
    };
    use uuid::Uuid;

    use super::*;
    use crate::application::collaborators::{GreatCircleGeoService, RateCardPricing};
    use crate::application::read_model::InMemoryTripReadModel;
    use crate::domain::ports::{DistanceEstimate, EtaEstimate};
    use crate::realtime::{HEARTBEAT_EVENT_TYPE, SNAPSHOT_EVENT_TYPE};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    fn pickup() -> GeoPoint {
        GeoPoint {
            latitude: 40.71,
            longitude: -74.00,
        }
    }

    fn destination() -> GeoPoint {
        GeoPoint {
            latitude: 40.75,
            longitude: -73.98,
        }
    }

    struct Harness {
        service: TripLifecycleService,
        events: Arc<InMemoryEventRepository>,
        read_model: Arc<InMemoryTripReadModel>,
    }

    fn harness() -> Harness {
        let events = Arc::new(InMemoryEventRepository::new());
        let read_model = Arc::new(InMemoryTripReadModel::new());
        let service = TripLifecycleService::new(
            events.clone(),
            read_model.clone(),
            Arc::new(GreatCircleGeoService),
            Arc::new(RateCardPricing),
            SubscriptionHub::default(),
            Arc::new(SteppingClock::new(t0(), Duration::seconds(1))),
        );
        Harness {
            service,
            events,
            read_model,
        }
    }

    fn request(rider_id: &str) -> RequestTrip {
        RequestTrip {
            correlation_id: Uuid::new_v4(),
            rider_id: rider_id.to_owned(),
            pickup: pickup(),
            destination: destination(),
            vehicle_type: VehicleType::Economy,
        }
    }

    fn match_cmd(trip_id: Uuid, driver_id: &str) -> MatchDriver {
        MatchDriver {
            correlation_id: Uuid::new_v4(),
            trip_id,
            driver_id: driver_id.to_owned(),
            vehicle_id: "v1".to_owned(),
            eta_seconds: 180,
            fare: None,
        }
    }

    fn start_cmd(trip_id: Uuid, driver_id: &str) -> StartTrip {
        StartTrip {
            correlation_id: Uuid::new_v4(),
            trip_id,
            driver_id: driver_id.to_owned(),
        }
    }

    fn complete_cmd(trip_id: Uuid, actual_fare: Option<f64>) -> CompleteTrip {
        CompleteTrip {
            correlation_id: Uuid::new_v4(),
            trip_id,
            driver_id: "d1".to_owned(),
            actual_fare,
            distance_km: 5.2,
            duration_seconds: 900,
        }
    }

    fn cancel_cmd(trip_id: Uuid, user_id: &str) -> CancelTrip {
        CancelTrip {
            correlation_id: Uuid::new_v4(),
            trip_id,
            user_id: user_id.to_owned(),
            reason: "changed plans".to_owned(),
        }
    }

    async fn requested_trip(h: &Harness, rider_id: &str) -> Uuid {
        h.service.request_trip(&request(rider_id)).await.unwrap().trip.id
    }

    async fn in_progress_trip(h: &Harness) -> Uuid {
        let trip_id = requested_trip(h, "r1").await;
        h.service.match_driver(&match_cmd(trip_id, "d1")).await.unwrap();
        h.service.start_trip(&start_cmd(trip_id, "d1")).await.unwrap();
        trip_id
    }

    #[tokio::test]
    async fn test_end_to_end_lifecycle() {
        // Arrange
        let h = harness();

        // Act / Assert: request
        let requested = h.service.request_trip(&request("r1")).await.unwrap();
        let trip_id = requested.trip.id;
        assert_eq!(requested.trip.state, TripState::Requested);
        assert_eq!(requested.trip.version, 1);
        assert!(requested.trip.estimated_fare > 0.0);
        assert_eq!(requested.stored_events[0].event_type, "trip.requested");

        // match
        let matched = h.service.match_driver(&match_cmd(trip_id, "d1")).await.unwrap();
        assert_eq!(matched.trip.state, TripState::Matched);
        assert_eq!(matched.trip.version, 2);
        assert!(matched.trip.matched_at.is_some());

        // start
        let started = h.service.start_trip(&start_cmd(trip_id, "d1")).await.unwrap();
        let versions: Vec<(String, i64)> = started
            .stored_events
            .iter()
            .map(|e| (e.event_type.clone(), e.version))
            .collect();
        assert_eq!(
            versions,
            vec![
                ("trip.started".to_owned(), 3),
                ("trip.in_progress".to_owned(), 4)
            ]
        );
        assert_eq!(started.trip.state, TripState::InProgress);

        // complete
        let completed = h
            .service
            .complete_trip(&complete_cmd(trip_id, Some(12.50)))
            .await
            .unwrap();
        assert_eq!(completed.trip.state, TripState::Completed);
        assert_eq!(completed.trip.version, 5);
        assert_eq!(completed.trip.actual_fare, Some(12.50));
        assert_eq!(completed.trip.duration_seconds, Some(900));
        assert!(completed.trip.completed_at.is_some());

        // a second match is rejected
        let result = h.service.match_driver(&match_cmd(trip_id, "d2")).await;
        match result.unwrap_err() {
            DomainError::InvalidTransition { from, to } => {
                assert_eq!(from, "completed");
                assert_eq!(to, "matched");
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }

        // read model and event store agree
        let projected = h.read_model.get_trip(trip_id).await.unwrap().unwrap();
        let replayed = reconstitute(trip_id, &h.events.events_for(trip_id)).unwrap();
        assert_eq!(projected, completed.trip);
        assert_eq!(replayed, completed.trip);
    }

    #[tokio::test]
    async fn test_request_trip_rejected_while_rider_has_active_trip() {
        // Arrange
        let h = harness();
        let first = requested_trip(&h, "r1").await;

        // Act
        let second = h.service.request_trip(&request("r1")).await;

        // Assert
        assert!(matches!(second, Err(DomainError::Conflict(_))));
        h.service.cancel_trip(&cancel_cmd(first, "r1")).await.unwrap();
        assert!(h.service.request_trip(&request("r1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_request_trip_rejects_invalid_location() {
        let h = harness();
        let mut command = request("r1");
        command.pickup.latitude = 120.0;

        let result = h.service.request_trip(&command).await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(h.events.append_calls(), 0);
    }

    struct BrokenGeo;

    #[async_trait]
    impl GeoService for BrokenGeo {
        async fn calculate_distance(
            &self,
            _origin: GeoPoint,
            _destination: GeoPoint,
        ) -> Result<DistanceEstimate, DomainError> {
            Err(DomainError::Infrastructure("geo engine timeout".into()))
        }

        async fn calculate_eta(
            &self,
            _origin: GeoPoint,
            _destination: GeoPoint,
            _vehicle_type: VehicleType,
        ) -> Result<EtaEstimate, DomainError> {
            Err(DomainError::Infrastructure("geo engine timeout".into()))
        }
    }

    #[tokio::test]
    async fn test_request_trip_collaborator_failure_creates_nothing() {
        // Arrange
        let events = Arc::new(InMemoryEventRepository::new());
        let read_model = Arc::new(InMemoryTripReadModel::new());
        let service = TripLifecycleService::new(
            events.clone(),
            read_model.clone(),
            Arc::new(BrokenGeo),
            Arc::new(RateCardPricing),
            SubscriptionHub::default(),
            Arc::new(FixedClock(t0())),
        );

        // Act
        let result = service.request_trip(&request("r1")).await;

        // Assert
        assert!(matches!(result, Err(DomainError::Dependency(_))));
        assert_eq!(events.append_calls(), 0);
        assert!(read_model.find_active_trip_for_rider("r1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_busy_driver_cannot_be_matched_to_second_trip() {
        // Arrange
        let h = harness();
        let trip_a = requested_trip(&h, "r1").await;
        let trip_b = requested_trip(&h, "r2").await;
        h.service.match_driver(&match_cmd(trip_a, "d1")).await.unwrap();

        // Act
        let result = h.service.match_driver(&match_cmd(trip_b, "d1")).await;

        // Assert
        assert!(matches!(result, Err(DomainError::Conflict(_))));
        let b = h.read_model.get_trip(trip_b).await.unwrap().unwrap();
        assert_eq!(b.state, TripState::Requested);
        assert!(b.driver_id.is_none());
        assert_eq!(h.events.events_for(trip_b).len(), 1);
    }

    #[tokio::test]
    async fn test_disputed_trip_blocks_rider_but_releases_driver() {
        // Arrange
        let h = harness();
        let trip_id = in_progress_trip(&h).await;
        h.service
            .complete_trip(&complete_cmd(trip_id, Some(20.0)))
            .await
            .unwrap();
        h.service
            .dispute_trip(&DisputeTrip {
                correlation_id: Uuid::new_v4(),
                trip_id,
                user_id: "r1".to_owned(),
                reason: "wrong route".to_owned(),
            })
            .await
            .unwrap();
        let other = requested_trip(&h, "r2").await;

        // Act
        let again = h.service.request_trip(&request("r1")).await;
        let rematch = h.service.match_driver(&match_cmd(other, "d1")).await;
        let active = h.read_model.get_active_trips().await.unwrap();

        // Assert
        assert!(matches!(again, Err(DomainError::Conflict(_))));
        assert_eq!(rematch.unwrap().trip.state, TripState::Matched);
        assert!(active.iter().any(|t| t.id == trip_id));
    }

    #[tokio::test]
    async fn test_concurrent_requests_by_one_rider_create_one_trip() {
        // Arrange
        let h = Arc::new(harness());

        // Act
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let h = Arc::clone(&h);
            tasks.push(tokio::spawn(async move {
                h.service.request_trip(&request("r1")).await
            }));
        }
        let mut created = 0;
        let mut conflicts = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(DomainError::Conflict(_)) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        // Assert
        assert_eq!(created, 1);
        assert_eq!(conflicts, 7);
        let active = h.read_model.get_active_trips().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].rider_id, "r1");
    }

    #[tokio::test]
    async fn test_concurrent_matches_of_one_driver_assign_one_trip() {
        // Arrange
        let h = Arc::new(harness());
        let mut trip_ids = Vec::new();
        for i in 0..8 {
            trip_ids.push(requested_trip(&h, &format!("r{i}")).await);
        }

        // Act
        let mut tasks = Vec::new();
        for trip_id in trip_ids {
            let h = Arc::clone(&h);
            tasks.push(tokio::spawn(async move {
                h.service.match_driver(&match_cmd(trip_id, "d1")).await
            }));
        }
        let mut matched = 0;
        let mut conflicts = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => matched += 1,
                Err(DomainError::Conflict(_)) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        // Assert
        assert_eq!(matched, 1);
        assert_eq!(conflicts, 7);
        let busy = h.read_model.find_active_trip_for_driver("d1").await.unwrap();
        assert_eq!(busy.map(|t| t.state), Some(TripState::Matched));
    }

    #[tokio::test]
    async fn test_cancel_by_stranger_is_unauthorized_in_every_state() {
        // Arrange
        let h = harness();
        let requested = requested_trip(&h, "r1").await;
        let matched = requested_trip(&h, "r2").await;
        h.service.match_driver(&match_cmd(matched, "d2")).await.unwrap();
        let completed = requested_trip(&h, "r3").await;
        h.service.match_driver(&match_cmd(completed, "d1")).await.unwrap();
        h.service.start_trip(&start_cmd(completed, "d1")).await.unwrap();
        h.service
            .complete_trip(&complete_cmd(completed, Some(10.0)))
            .await
            .unwrap();
        let cancelled = requested_trip(&h, "r4").await;
        h.service.cancel_trip(&cancel_cmd(cancelled, "r4")).await.unwrap();

        for trip_id in [requested, matched, completed, cancelled] {
            // Act
            let result = h.service.cancel_trip(&cancel_cmd(trip_id, "stranger")).await;

            // Assert
            assert!(
                matches!(result, Err(DomainError::Unauthorized(_))),
                "trip {trip_id}: {result:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_cancel_records_reason_and_actor() {
        // Arrange
        let h = harness();
        let trip_id = requested_trip(&h, "r1").await;
        h.service.match_driver(&match_cmd(trip_id, "d1")).await.unwrap();

        // Act
        let result = h.service.cancel_trip(&cancel_cmd(trip_id, "d1")).await.unwrap();

        // Assert
        assert_eq!(result.trip.state, TripState::Cancelled);
        assert!(result.trip.cancelled_at.is_some());
        assert_eq!(result.trip.metadata["reason"], "changed plans");
        assert_eq!(result.trip.metadata["cancelled_by"], "d1");
        assert_eq!(result.trip.metadata["cancelled_by_role"], "driver");
        assert_eq!(result.stored_events[0].user_id.as_deref(), Some("d1"));
    }

    #[tokio::test]
    async fn test_cancel_completed_trip_is_invalid_transition() {
        let h = harness();
        let trip_id = in_progress_trip(&h).await;
        h.service
            .complete_trip(&complete_cmd(trip_id, Some(10.0)))
            .await
            .unwrap();

        let result = h.service.cancel_trip(&cancel_cmd(trip_id, "r1")).await;

        assert!(matches!(result, Err(DomainError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_only_assigned_driver_can_start() {
        let h = harness();
        let trip_id = requested_trip(&h, "r1").await;
        h.service.match_driver(&match_cmd(trip_id, "d1")).await.unwrap();

        let result = h.service.start_trip(&start_cmd(trip_id, "d9")).await;

        assert!(matches!(result, Err(DomainError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_start_before_match_is_unauthorized() {
        let h = harness();
        let trip_id = requested_trip(&h, "r1").await;

        // No driver is assigned yet; authorization fails before the state check.
        let result = h.service.start_trip(&start_cmd(trip_id, "d1")).await;

        assert!(matches!(result, Err(DomainError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_pickup_progress_steps() {
        // Arrange
        let h = harness();
        let trip_id = requested_trip(&h, "r1").await;
        h.service
            .start_matching(&StartMatching {
                correlation_id: Uuid::new_v4(),
                trip_id,
            })
            .await
            .unwrap();
        h.service.match_driver(&match_cmd(trip_id, "d1")).await.unwrap();

        // Act
        let en_route = h
            .service
            .mark_driver_en_route(&MarkDriverEnRoute {
                correlation_id: Uuid::new_v4(),
                trip_id,
                driver_id: "d1".to_owned(),
            })
            .await
            .unwrap();
        let arrived = h
            .service
            .mark_driver_arrived(&MarkDriverArrived {
                correlation_id: Uuid::new_v4(),
                trip_id,
                driver_id: "d1".to_owned(),
            })
            .await
            .unwrap();
        let started = h.service.start_trip(&start_cmd(trip_id, "d1")).await.unwrap();

        // Assert
        assert_eq!(en_route.trip.state, TripState::DriverEnRoute);
        assert_eq!(arrived.trip.state, TripState::DriverArrived);
        assert_eq!(started.trip.state, TripState::InProgress);
        assert_eq!(started.trip.version, 7);
    }

    #[tokio::test]
    async fn test_fail_trip_has_no_user_attribution() {
        let h = harness();
        let trip_id = requested_trip(&h, "r1").await;
        h.service
            .start_matching(&StartMatching {
                correlation_id: Uuid::new_v4(),
                trip_id,
            })
            .await
            .unwrap();

        let result = h
            .service
            .fail_trip(&FailTrip {
                correlation_id: Uuid::new_v4(),
                trip_id,
                reason: "no drivers available".to_owned(),
            })
            .await
            .unwrap();

        assert_eq!(result.trip.state, TripState::Failed);
        assert!(result.stored_events[0].user_id.is_none());
        assert_eq!(result.trip.metadata["failure_reason"], "no drivers available");
    }

    #[tokio::test]
    async fn test_fail_from_requested_is_invalid_transition() {
        let h = harness();
        let trip_id = requested_trip(&h, "r1").await;

        let result = h
            .service
            .fail_trip(&FailTrip {
                correlation_id: Uuid::new_v4(),
                trip_id,
                reason: "timeout".to_owned(),
            })
            .await;

        assert!(matches!(result, Err(DomainError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_dispute_and_resolution_adjusts_fare() {
        // Arrange
        let h = harness();
        let trip_id = in_progress_trip(&h).await;
        let completed = h
            .service
            .complete_trip(&complete_cmd(trip_id, Some(20.0)))
            .await
            .unwrap();

        // Act
        let disputed = h
            .service
            .dispute_trip(&DisputeTrip {
                correlation_id: Uuid::new_v4(),
                trip_id,
                user_id: "r1".to_owned(),
                reason: "wrong route".to_owned(),
            })
            .await
            .unwrap();
        let resolved = h
            .service
            .resolve_dispute(&ResolveDispute {
                correlation_id: Uuid::new_v4(),
                trip_id,
                resolution: "partial refund".to_owned(),
                adjusted_fare: Some(15.0),
            })
            .await
            .unwrap();

        // Assert
        assert_eq!(disputed.trip.state, TripState::Disputed);
        assert_eq!(resolved.trip.state, TripState::Completed);
        assert_eq!(resolved.trip.actual_fare, Some(15.0));
        assert_eq!(resolved.trip.completed_at, completed.trip.completed_at);
    }

    #[tokio::test]
    async fn test_resolve_dispute_requires_disputed_trip() {
        let h = harness();
        let trip_id = in_progress_trip(&h).await;

        let result = h
            .service
            .resolve_dispute(&ResolveDispute {
                correlation_id: Uuid::new_v4(),
                trip_id,
                resolution: "none".to_owned(),
                adjusted_fare: None,
            })
            .await;

        assert!(matches!(result, Err(DomainError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_complete_without_fare_uses_pricing() {
        let h = harness();
        let trip_id = in_progress_trip(&h).await;

        let result = h
            .service
            .complete_trip(&complete_cmd(trip_id, None))
            .await
            .unwrap();

        // Economy: 2.50 + 1.20 * 5.2 + 0.25 * 15
        assert_eq!(result.trip.actual_fare, Some(12.49));
    }

    #[tokio::test]
    async fn test_update_location_only_after_match() {
        // Arrange
        let h = harness();
        let trip_id = requested_trip(&h, "r1").await;
        let update = |user: &str| UpdateLocation {
            correlation_id: Uuid::new_v4(),
            trip_id,
            user_id: user.to_owned(),
            location: GeoPoint {
                latitude: 40.72,
                longitude: -73.99,
            },
        };

        // Act
        let before_match = h.service.update_location(&update("r1")).await;
        h.service.match_driver(&match_cmd(trip_id, "d1")).await.unwrap();
        let after_match = h.service.update_location(&update("d1")).await.unwrap();
        let stranger = h.service.update_location(&update("x")).await;

        // Assert
        assert!(matches!(before_match, Err(DomainError::Conflict(_))));
        assert!(matches!(stranger, Err(DomainError::Unauthorized(_))));
        assert_eq!(after_match.trip.state, TripState::Matched);
        assert_eq!(after_match.trip.version, 3);
        assert_eq!(after_match.trip.current_location, Some(update("d1").location));
        assert_eq!(after_match.trip.metadata["location_updated_by"], "driver");
    }

    #[tokio::test]
    async fn test_unknown_trip_is_not_found() {
        let h = harness();
        let trip_id = Uuid::new_v4();

        let command = h.service.cancel_trip(&cancel_cmd(trip_id, "r1")).await;
        let subscribe = h.service.subscribe_to_trip_updates(trip_id).await;

        assert!(matches!(command, Err(DomainError::AggregateNotFound(id)) if id == trip_id));
        assert!(matches!(subscribe, Err(DomainError::AggregateNotFound(_))));
    }

    #[tokio::test]
    async fn test_version_conflict_is_retried_from_fresh_replay() {
        // Arrange
        let seed = harness();
        let trip_id = requested_trip(&seed, "r1").await;
        let flaky = Arc::new(ConflictingEventRepository::new(
            InMemoryEventRepository::with_events(seed.events.events_for(trip_id)),
            2,
        ));
        let service = TripLifecycleService::new(
            flaky.clone(),
            Arc::new(InMemoryTripReadModel::new()),
            Arc::new(GreatCircleGeoService),
            Arc::new(RateCardPricing),
            SubscriptionHub::default(),
            Arc::new(FixedClock(t0())),
        );

        // Act
        let result = service.match_driver(&match_cmd(trip_id, "d1")).await.unwrap();

        // Assert
        assert_eq!(result.trip.version, 2);
        assert_eq!(flaky.inner().events_for(trip_id).len(), 2);
    }

    #[tokio::test]
    async fn test_version_conflict_surfaces_after_max_attempts() {
        // Arrange
        let seed = harness();
        let trip_id = requested_trip(&seed, "r1").await;
        let flaky = Arc::new(ConflictingEventRepository::new(
            InMemoryEventRepository::with_events(seed.events.events_for(trip_id)),
            5,
        ));
        let service = TripLifecycleService::new(
            flaky.clone(),
            Arc::new(InMemoryTripReadModel::new()),
            Arc::new(GreatCircleGeoService),
            Arc::new(RateCardPricing),
            SubscriptionHub::default(),
            Arc::new(FixedClock(t0())),
        );

        // Act
        let result = service.match_driver(&match_cmd(trip_id, "d1")).await;

        // Assert
        assert!(result.unwrap_err().is_concurrency_conflict());
        assert_eq!(flaky.inner().append_calls(), 0);
        assert_eq!(flaky.inner().events_for(trip_id).len(), 1);
    }

    #[tokio::test]
    async fn test_stale_read_model_is_caught_up_from_event_store() {
        // Arrange
        let h = harness();
        let trip_id = requested_trip(&h, "r1").await;
        let stale = h.read_model.get_trip(trip_id).await.unwrap().unwrap();
        h.service.match_driver(&match_cmd(trip_id, "d1")).await.unwrap();
        h.read_model.replace_trip(&stale).await.unwrap();

        // Act
        let started = h.service.start_trip(&start_cmd(trip_id, "d1")).await.unwrap();

        // Assert
        assert_eq!(started.trip.version, 4);
        assert_eq!(started.trip.driver_id.as_deref(), Some("d1"));
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_infrastructure() {
        let service = TripLifecycleService::new(
            Arc::new(FailingEventRepository),
            Arc::new(InMemoryTripReadModel::new()),
            Arc::new(GreatCircleGeoService),
            Arc::new(RateCardPricing),
            SubscriptionHub::default(),
            Arc::new(FixedClock(t0())),
        );

        let result = service.request_trip(&request("r1")).await;

        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
    }

    #[tokio::test]
    async fn test_subscriber_sees_snapshot_then_each_event() {
        // Arrange
        let h = harness();
        let trip_id = requested_trip(&h, "r1").await;
        let mut subscription = h.service.subscribe_to_trip_updates(trip_id).await.unwrap();

        // Act
        h.service.match_driver(&match_cmd(trip_id, "d1")).await.unwrap();
        h.service.start_trip(&start_cmd(trip_id, "d1")).await.unwrap();

        // Assert
        let snapshot = subscription.next().await.unwrap();
        assert_eq!(snapshot.event_type(), Some(SNAPSHOT_EVENT_TYPE));
        assert_eq!(snapshot.version, 1);
        let mut seen = Vec::new();
        for _ in 0..3 {
            let update = subscription.next().await.unwrap();
            assert_ne!(update.event_type(), Some(HEARTBEAT_EVENT_TYPE));
            seen.push((update.old_status, update.new_status, update.version));
        }
        assert_eq!(
            seen,
            vec![
                (Some(TripState::Requested), TripState::Matched, 2),
                (Some(TripState::Matched), TripState::Started, 3),
                (Some(TripState::Started), TripState::InProgress, 4),
            ]
        );
        drop(subscription);
        assert!(h.service.hub().trip_stats(trip_id).is_none());
    }

    #[tokio::test]
    async fn test_concurrent_commands_on_one_trip_are_serialized() {
        // Arrange
        let h = Arc::new(harness());
        let trip_id = in_progress_trip(&h).await;

        // Act
        let mut tasks = Vec::new();
        for i in 0..10 {
            let h = Arc::clone(&h);
            tasks.push(tokio::spawn(async move {
                h.service
                    .update_location(&UpdateLocation {
                        correlation_id: Uuid::new_v4(),
                        trip_id,
                        user_id: "d1".to_owned(),
                        location: GeoPoint {
                            latitude: 40.72 + f64::from(i) * 0.001,
                            longitude: -73.99,
                        },
                    })
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Assert
        let versions: Vec<i64> = h.events.events_for(trip_id).iter().map(|e| e.version).collect();
        assert_eq!(versions, (1..=14).collect::<Vec<_>>());
        assert_eq!(h.read_model.get_trip(trip_id).await.unwrap().unwrap().version, 14);
    }

    #[tokio::test]
    async fn test_direct_append_with_stale_version_conflicts() {
        let h = harness();
        let trip_id = requested_trip(&h, "r1").await;
        let mut duplicate = h.events.events_for(trip_id)[0].clone();
        duplicate.event_id = Uuid::new_v4();

        let result = h.events.save_event(&duplicate).await;

        assert!(result.unwrap_err().is_concurrency_conflict());
    }
}
