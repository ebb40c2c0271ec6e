//! Routes for trip commands, per-trip queries, and the live update stream.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::{
    Json, Router,
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use tripflow_trips::application::command_handlers::TripCommandResult;
use tripflow_trips::application::query_handlers::{self, TripEventView};
use tripflow_trips::domain::aggregates::TripAggregate;
use tripflow_trips::domain::commands;
use tripflow_trips::domain::location::GeoPoint;
use tripflow_trips::domain::ports::VehicleType;
use tripflow_trips::realtime::TripUpdateEvent;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /trips.
#[derive(Debug, Deserialize)]
pub struct RequestTripRequest {
    /// The rider asking for the trip.
    pub rider_id: String,
    /// Pickup coordinate.
    pub pickup: GeoPoint,
    /// Drop-off coordinate.
    pub destination: GeoPoint,
    /// Requested vehicle class; economy when omitted.
    #[serde(default)]
    pub vehicle_type: VehicleType,
}

/// Request body for POST /trips/{id}/match.
#[derive(Debug, Deserialize)]
pub struct MatchDriverRequest {
    /// The accepting driver.
    pub driver_id: String,
    /// The driver's vehicle.
    pub vehicle_id: String,
    /// Driver ETA to pickup, in seconds.
    pub eta_seconds: i64,
    /// Fare agreed by dispatch, if any.
    #[serde(default)]
    pub fare: Option<f64>,
}

/// Request body for driver-only progress commands.
#[derive(Debug, Deserialize)]
pub struct DriverRequest {
    /// The driver issuing the command.
    pub driver_id: String,
}

/// Request body for POST /trips/{id}/complete.
#[derive(Debug, Deserialize)]
pub struct CompleteTripRequest {
    /// The assigned driver.
    pub driver_id: String,
    /// Final fare; priced from distance and duration when omitted.
    #[serde(default)]
    pub actual_fare: Option<f64>,
    /// Distance actually driven.
    pub distance_km: f64,
    /// Trip duration.
    pub duration_seconds: i64,
}

/// Request body for commands a rider or driver issues with a reason.
#[derive(Debug, Deserialize)]
pub struct PartyReasonRequest {
    /// The rider or driver issuing the command.
    pub user_id: String,
    /// Free-text reason.
    pub reason: String,
}

/// Request body for POST /trips/{id}/fail.
#[derive(Debug, Deserialize)]
pub struct FailTripRequest {
    /// Why the trip could not be fulfilled.
    pub reason: String,
}

/// Request body for POST /trips/{id}/resolve-dispute.
#[derive(Debug, Deserialize)]
pub struct ResolveDisputeRequest {
    /// Outcome description.
    pub resolution: String,
    /// Corrected fare, if the resolution changes it.
    #[serde(default)]
    pub adjusted_fare: Option<f64>,
}

/// Request body for POST /trips/{id}/location.
#[derive(Debug, Deserialize)]
pub struct UpdateLocationRequest {
    /// The rider or driver reporting the position.
    pub user_id: String,
    /// Reported coordinate.
    pub location: GeoPoint,
}

/// Response body returned after a command is successfully handled.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// The trip after the command.
    pub trip: TripAggregate,
    /// IDs of the events the command appended.
    pub event_ids: Vec<Uuid>,
}

impl From<TripCommandResult> for CommandResponse {
    fn from(result: TripCommandResult) -> Self {
        Self {
            event_ids: result.stored_events.iter().map(|e| e.event_id).collect(),
            trip: result.trip,
        }
    }
}

/// POST /trips
#[instrument(skip(state, request), fields(rider_id = %request.rider_id))]
async fn request_trip(
    State(state): State<AppState>,
    Json(request): Json<RequestTripRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let command = commands::RequestTrip {
        correlation_id: Uuid::new_v4(),
        rider_id: request.rider_id,
        pickup: request.pickup,
        destination: request.destination,
        vehicle_type: request.vehicle_type,
    };

    info!(correlation_id = %command.correlation_id, "handling request_trip command");

    let result = state.service.request_trip(&command).await?;
    Ok((StatusCode::CREATED, Json(result.into())))
}

/// POST /trips/{id}/matching
#[instrument(skip(state))]
async fn start_matching(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::StartMatching {
        correlation_id: Uuid::new_v4(),
        trip_id,
    };

    info!(correlation_id = %command.correlation_id, "handling start_matching command");

    Ok(Json(state.service.start_matching(&command).await?.into()))
}

/// POST /trips/{id}/match
#[instrument(skip(state, request), fields(driver_id = %request.driver_id))]
async fn match_driver(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(request): Json<MatchDriverRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::MatchDriver {
        correlation_id: Uuid::new_v4(),
        trip_id,
        driver_id: request.driver_id,
        vehicle_id: request.vehicle_id,
        eta_seconds: request.eta_seconds,
        fare: request.fare,
    };

    info!(correlation_id = %command.correlation_id, "handling match_driver command");

    Ok(Json(state.service.match_driver(&command).await?.into()))
}

/// POST /trips/{id}/en-route
#[instrument(skip(state, request), fields(driver_id = %request.driver_id))]
async fn mark_driver_en_route(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(request): Json<DriverRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::MarkDriverEnRoute {
        correlation_id: Uuid::new_v4(),
        trip_id,
        driver_id: request.driver_id,
    };

    info!(correlation_id = %command.correlation_id, "handling mark_driver_en_route command");

    Ok(Json(state.service.mark_driver_en_route(&command).await?.into()))
}

/// POST /trips/{id}/arrived
#[instrument(skip(state, request), fields(driver_id = %request.driver_id))]
async fn mark_driver_arrived(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(request): Json<DriverRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::MarkDriverArrived {
        correlation_id: Uuid::new_v4(),
        trip_id,
        driver_id: request.driver_id,
    };

    info!(correlation_id = %command.correlation_id, "handling mark_driver_arrived command");

    Ok(Json(state.service.mark_driver_arrived(&command).await?.into()))
}

/// POST /trips/{id}/start
#[instrument(skip(state, request), fields(driver_id = %request.driver_id))]
async fn start_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(request): Json<DriverRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::StartTrip {
        correlation_id: Uuid::new_v4(),
        trip_id,
        driver_id: request.driver_id,
    };

    info!(correlation_id = %command.correlation_id, "handling start_trip command");

    Ok(Json(state.service.start_trip(&command).await?.into()))
}

/// POST /trips/{id}/complete
#[instrument(skip(state, request), fields(driver_id = %request.driver_id))]
async fn complete_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(request): Json<CompleteTripRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::CompleteTrip {
        correlation_id: Uuid::new_v4(),
        trip_id,
        driver_id: request.driver_id,
        actual_fare: request.actual_fare,
        distance_km: request.distance_km,
        duration_seconds: request.duration_seconds,
    };

    info!(correlation_id = %command.correlation_id, "handling complete_trip command");

    Ok(Json(state.service.complete_trip(&command).await?.into()))
}

/// POST /trips/{id}/cancel
#[instrument(skip(state, request), fields(user_id = %request.user_id))]
async fn cancel_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(request): Json<PartyReasonRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::CancelTrip {
        correlation_id: Uuid::new_v4(),
        trip_id,
        user_id: request.user_id,
        reason: request.reason,
    };

    info!(correlation_id = %command.correlation_id, "handling cancel_trip command");

    Ok(Json(state.service.cancel_trip(&command).await?.into()))
}

/// POST /trips/{id}/fail
#[instrument(skip(state, request))]
async fn fail_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(request): Json<FailTripRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::FailTrip {
        correlation_id: Uuid::new_v4(),
        trip_id,
        reason: request.reason,
    };

    info!(correlation_id = %command.correlation_id, "handling fail_trip command");

    Ok(Json(state.service.fail_trip(&command).await?.into()))
}

/// POST /trips/{id}/dispute
#[instrument(skip(state, request), fields(user_id = %request.user_id))]
async fn dispute_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(request): Json<PartyReasonRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::DisputeTrip {
        correlation_id: Uuid::new_v4(),
        trip_id,
        user_id: request.user_id,
        reason: request.reason,
    };

    info!(correlation_id = %command.correlation_id, "handling dispute_trip command");

    Ok(Json(state.service.dispute_trip(&command).await?.into()))
}

/// POST /trips/{id}/resolve-dispute
#[instrument(skip(state, request))]
async fn resolve_dispute(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(request): Json<ResolveDisputeRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::ResolveDispute {
        correlation_id: Uuid::new_v4(),
        trip_id,
        resolution: request.resolution,
        adjusted_fare: request.adjusted_fare,
    };

    info!(correlation_id = %command.correlation_id, "handling resolve_dispute command");

    Ok(Json(state.service.resolve_dispute(&command).await?.into()))
}

/// POST /trips/{id}/location
#[instrument(skip(state, request), fields(user_id = %request.user_id))]
async fn update_location(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(request): Json<UpdateLocationRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::UpdateLocation {
        correlation_id: Uuid::new_v4(),
        trip_id,
        user_id: request.user_id,
        location: request.location,
    };

    Ok(Json(state.service.update_location(&command).await?.into()))
}

/// GET /trips/{id}
async fn get_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<TripAggregate>, ApiError> {
    let trip = query_handlers::get_trip(
        trip_id,
        state.read_model.as_ref(),
        state.event_repository.as_ref(),
    )
    .await?;
    Ok(Json(trip))
}

/// GET /trips/active
async fn get_active_trips(
    State(state): State<AppState>,
) -> Result<Json<Vec<TripAggregate>>, ApiError> {
    let trips = query_handlers::get_active_trips(state.read_model.as_ref()).await?;
    Ok(Json(trips))
}

/// GET /trips/{id}/events
async fn get_trip_events(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<Vec<TripEventView>>, ApiError> {
    let history = query_handlers::get_trip_events(trip_id, state.event_repository.as_ref()).await?;
    Ok(Json(history))
}

/// POST /trips/{id}/rebuild
#[instrument(skip(state))]
async fn rebuild_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<TripAggregate>, ApiError> {
    let trip = query_handlers::rebuild_trip(
        trip_id,
        state.read_model.as_ref(),
        state.event_repository.as_ref(),
    )
    .await?;
    Ok(Json(trip))
}

/// GET /trips/{id}/updates
///
/// Server-sent events: a `snapshot` first, then one event per appended trip
/// event, with `heartbeat` events while idle. Closing the connection drops
/// the subscription.
#[instrument(skip(state))]
async fn trip_updates(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let subscription = state.service.subscribe_to_trip_updates(trip_id).await?;
    info!("update stream opened");
    let stream = subscription.into_stream().filter_map(|update| async move {
        match to_sse_event(&update) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                warn!(trip_id = %update.trip_id, error = %e, "skipping unserializable update");
                None
            }
        }
    });
    Ok(Sse::new(stream))
}

fn to_sse_event(update: &TripUpdateEvent) -> Result<Event, axum::Error> {
    let name = update.event_type().unwrap_or("update").to_owned();
    Event::default()
        .event(name)
        .id(update.version.to_string())
        .json_data(update)
}

/// Returns the router for trip routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(request_trip))
        .route("/active", get(get_active_trips))
        .route("/{trip_id}", get(get_trip))
        .route("/{trip_id}/events", get(get_trip_events))
        .route("/{trip_id}/rebuild", post(rebuild_trip))
        .route("/{trip_id}/updates", get(trip_updates))
        .route("/{trip_id}/matching", post(start_matching))
        .route("/{trip_id}/match", post(match_driver))
        .route("/{trip_id}/en-route", post(mark_driver_en_route))
        .route("/{trip_id}/arrived", post(mark_driver_arrived))
        .route("/{trip_id}/start", post(start_trip))
        .route("/{trip_id}/complete", post(complete_trip))
        .route("/{trip_id}/cancel", post(cancel_trip))
        .route("/{trip_id}/fail", post(fail_trip))
        .route("/{trip_id}/dispute", post(dispute_trip))
        .route("/{trip_id}/resolve-dispute", post(resolve_dispute))
        .route("/{trip_id}/location", post(update_location))
}
