//! `PostgreSQL` implementation of the `TripReadModel` trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres};
use tracing::instrument;
use uuid::Uuid;

use tripflow_core::error::DomainError;
use tripflow_trips::application::read_model::TripReadModel;
use tripflow_trips::domain::aggregates::TripAggregate;
use tripflow_trips::domain::location::GeoPoint;
use tripflow_trips::domain::states::TripState;

/// PostgreSQL-backed trip read model.
#[derive(Debug, Clone)]
pub struct PgTripReadModel {
    pool: PgPool,
}

impl PgTripReadModel {
    /// Creates a new `PgTripReadModel`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn upsert(&self, trip: &TripAggregate, only_if_newer: bool) -> Result<bool, DomainError> {
        let sql = if only_if_newer {
            format!("{UPSERT} WHERE trip_read_model.version < EXCLUDED.version")
        } else {
            UPSERT.to_owned()
        };
        let result = sqlx::query(&sql)
            .bind(trip.id)
            .bind(&trip.rider_id)
            .bind(trip.driver_id.as_deref())
            .bind(trip.vehicle_id.as_deref())
            .bind(trip.vehicle_type.as_str())
            .bind(trip.state.as_str())
            .bind(trip.pickup_location.latitude)
            .bind(trip.pickup_location.longitude)
            .bind(trip.destination_location.latitude)
            .bind(trip.destination_location.longitude)
            .bind(trip.current_location.map(|p| p.latitude))
            .bind(trip.current_location.map(|p| p.longitude))
            .bind(trip.requested_at)
            .bind(trip.matched_at)
            .bind(trip.started_at)
            .bind(trip.completed_at)
            .bind(trip.cancelled_at)
            .bind(trip.estimated_fare)
            .bind(trip.actual_fare)
            .bind(trip.distance_km)
            .bind(trip.estimated_duration_seconds)
            .bind(trip.duration_seconds)
            .bind(trip.driver_eta_seconds)
            .bind(&trip.currency)
            .bind(trip.surge_multiplier)
            .bind(Json(&trip.metadata))
            .bind(trip.version)
            .bind(trip.last_updated)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("save_trip", &e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn fetch_trips(
        &self,
        operation: &str,
        query: QueryAs<'_, Postgres, TripRow, PgArguments>,
    ) -> Result<Vec<TripAggregate>, DomainError> {
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, &e))?;
        rows.into_iter().map(TripAggregate::try_from).collect()
    }
}

const COLUMNS: &str = "trip_id, rider_id, driver_id, vehicle_id, vehicle_type, state, \
    pickup_latitude, pickup_longitude, destination_latitude, destination_longitude, \
    current_latitude, current_longitude, requested_at, matched_at, started_at, completed_at, \
    cancelled_at, estimated_fare, actual_fare, distance_km, estimated_duration_seconds, \
    duration_seconds, driver_eta_seconds, currency, surge_multiplier, metadata, version, \
    last_updated";

const UPSERT: &str = r"
    INSERT INTO trip_read_model (
        trip_id, rider_id, driver_id, vehicle_id, vehicle_type, state,
        pickup_latitude, pickup_longitude, destination_latitude, destination_longitude,
        current_latitude, current_longitude, requested_at, matched_at, started_at, completed_at,
        cancelled_at, estimated_fare, actual_fare, distance_km, estimated_duration_seconds,
        duration_seconds, driver_eta_seconds, currency, surge_multiplier, metadata, version,
        last_updated
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
            $19, $20, $21, $22, $23, $24, $25, $26, $27, $28)
    ON CONFLICT (trip_id) DO UPDATE SET
        driver_id = EXCLUDED.driver_id,
        vehicle_id = EXCLUDED.vehicle_id,
        vehicle_type = EXCLUDED.vehicle_type,
        state = EXCLUDED.state,
        current_latitude = EXCLUDED.current_latitude,
        current_longitude = EXCLUDED.current_longitude,
        matched_at = EXCLUDED.matched_at,
        started_at = EXCLUDED.started_at,
        completed_at = EXCLUDED.completed_at,
        cancelled_at = EXCLUDED.cancelled_at,
        estimated_fare = EXCLUDED.estimated_fare,
        actual_fare = EXCLUDED.actual_fare,
        distance_km = EXCLUDED.distance_km,
        duration_seconds = EXCLUDED.duration_seconds,
        driver_eta_seconds = EXCLUDED.driver_eta_seconds,
        metadata = EXCLUDED.metadata,
        version = EXCLUDED.version,
        last_updated = EXCLUDED.last_updated
";

fn state_names(names: Vec<&'static str>) -> Vec<String> {
    names.into_iter().map(str::to_owned).collect()
}

#[derive(Debug, FromRow)]
struct TripRow {
    trip_id: Uuid,
    rider_id: String,
    driver_id: Option<String>,
    vehicle_id: Option<String>,
    vehicle_type: String,
    state: String,
    pickup_latitude: f64,
    pickup_longitude: f64,
    destination_latitude: f64,
    destination_longitude: f64,
    current_latitude: Option<f64>,
    current_longitude: Option<f64>,
    requested_at: DateTime<Utc>,
    matched_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    estimated_fare: f64,
    actual_fare: Option<f64>,
    distance_km: f64,
    estimated_duration_seconds: i64,
    duration_seconds: Option<i64>,
    driver_eta_seconds: Option<i64>,
    currency: String,
    surge_multiplier: f64,
    metadata: Json<BTreeMap<String, serde_json::Value>>,
    version: i64,
    last_updated: DateTime<Utc>,
}

impl TryFrom<TripRow> for TripAggregate {
    type Error = DomainError;

    fn try_from(row: TripRow) -> Result<Self, Self::Error> {
        let corrupt = |e: DomainError| {
            DomainError::Infrastructure(format!("corrupt read model row {}: {e}", row.trip_id))
        };
        let state = row.state.parse().map_err(corrupt)?;
        let vehicle_type = row.vehicle_type.parse().map_err(corrupt)?;
        let current_location = match (row.current_latitude, row.current_longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint {
                latitude,
                longitude,
            }),
            _ => None,
        };
        Ok(Self {
            id: row.trip_id,
            rider_id: row.rider_id,
            driver_id: row.driver_id,
            vehicle_id: row.vehicle_id,
            vehicle_type,
            pickup_location: GeoPoint {
                latitude: row.pickup_latitude,
                longitude: row.pickup_longitude,
            },
            destination_location: GeoPoint {
                latitude: row.destination_latitude,
                longitude: row.destination_longitude,
            },
            current_location,
            state,
            requested_at: row.requested_at,
            matched_at: row.matched_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            cancelled_at: row.cancelled_at,
            estimated_fare: row.estimated_fare,
            actual_fare: row.actual_fare,
            distance_km: row.distance_km,
            estimated_duration_seconds: row.estimated_duration_seconds,
            duration_seconds: row.duration_seconds,
            driver_eta_seconds: row.driver_eta_seconds,
            currency: row.currency,
            surge_multiplier: row.surge_multiplier,
            version: row.version,
            last_updated: row.last_updated,
            metadata: row.metadata.0,
        })
    }
}

#[async_trait]
impl TripReadModel for PgTripReadModel {
    #[instrument(skip(self, trip), fields(trip_id = %trip.id, version = trip.version), err)]
    async fn save_trip(&self, trip: &TripAggregate) -> Result<bool, DomainError> {
        self.upsert(trip, true).await
    }

    #[instrument(skip(self, trip), fields(trip_id = %trip.id, version = trip.version), err)]
    async fn replace_trip(&self, trip: &TripAggregate) -> Result<(), DomainError> {
        self.upsert(trip, false).await.map(|_| ())
    }

    async fn get_trip(&self, trip_id: Uuid) -> Result<Option<TripAggregate>, DomainError> {
        let row: Option<TripRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM trip_read_model WHERE trip_id = $1"))
                .bind(trip_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("get_trip", &e))?;
        row.map(TripAggregate::try_from).transpose()
    }

    async fn get_trips_by_rider(
        &self,
        rider_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<TripAggregate>, DomainError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM trip_read_model WHERE rider_id = $1 \
             ORDER BY requested_at DESC, trip_id LIMIT $2 OFFSET $3"
        );
        let query = sqlx::query_as(&sql)
            .bind(rider_id)
            .bind(i64::from(limit))
            .bind(i64::from(offset));
        self.fetch_trips("get_trips_by_rider", query).await
    }

    async fn get_trips_by_driver(
        &self,
        driver_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<TripAggregate>, DomainError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM trip_read_model WHERE driver_id = $1 \
             ORDER BY requested_at DESC, trip_id LIMIT $2 OFFSET $3"
        );
        let query = sqlx::query_as(&sql)
            .bind(driver_id)
            .bind(i64::from(limit))
            .bind(i64::from(offset));
        self.fetch_trips("get_trips_by_driver", query).await
    }

    async fn get_active_trips(&self) -> Result<Vec<TripAggregate>, DomainError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM trip_read_model WHERE state <> ALL($1) \
             ORDER BY requested_at ASC, trip_id"
        );
        let query = sqlx::query_as(&sql).bind(state_names(TripState::terminal_names()));
        self.fetch_trips("get_active_trips", query).await
    }

    async fn find_active_trip_for_rider(
        &self,
        rider_id: &str,
    ) -> Result<Option<TripAggregate>, DomainError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM trip_read_model WHERE rider_id = $1 AND state <> ALL($2) \
             ORDER BY requested_at DESC LIMIT 1"
        );
        let query = sqlx::query_as(&sql)
            .bind(rider_id)
            .bind(state_names(TripState::terminal_names()));
        let trips = self.fetch_trips("find_active_trip_for_rider", query).await?;
        Ok(trips.into_iter().next())
    }

    async fn find_active_trip_for_driver(
        &self,
        driver_id: &str,
    ) -> Result<Option<TripAggregate>, DomainError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM trip_read_model WHERE driver_id = $1 AND state = ANY($2) \
             ORDER BY requested_at DESC LIMIT 1"
        );
        let query = sqlx::query_as(&sql)
            .bind(driver_id)
            .bind(state_names(TripState::post_match_active_names()));
        let trips = self.fetch_trips("find_active_trip_for_driver", query).await?;
        Ok(trips.into_iter().next())
    }
}

fn map_sqlx_error(operation: &str, err: &sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("read model {operation} failed: {err}"))
}
