//! Per-rider and per-driver trip listings.

use axum::extract::{Path, Query, State};
use axum::{Json, Router, routing::get};
use serde::{Deserialize, Serialize};

use tripflow_trips::application::query_handlers;
use tripflow_trips::domain::aggregates::TripAggregate;

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_LIMIT: u32 = 20;

/// Pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct PageParams {
    /// Page size, `1..=100`.
    pub limit: Option<u32>,
    /// Rows to skip.
    pub offset: Option<u32>,
}

/// A page of trips, newest first.
#[derive(Debug, Serialize)]
pub struct TripPage {
    /// The trips on this page.
    pub trips: Vec<TripAggregate>,
    /// Page size used.
    pub limit: u32,
    /// Offset used.
    pub offset: u32,
}

/// GET /riders/{rider_id}/trips
async fn rider_trips(
    State(state): State<AppState>,
    Path(rider_id): Path<String>,
    Query(page): Query<PageParams>,
) -> Result<Json<TripPage>, ApiError> {
    let (limit, offset) = page.resolve();
    let trips =
        query_handlers::get_trips_by_rider(&rider_id, limit, offset, state.read_model.as_ref())
            .await?;
    Ok(Json(TripPage {
        trips,
        limit,
        offset,
    }))
}

/// GET /drivers/{driver_id}/trips
async fn driver_trips(
    State(state): State<AppState>,
    Path(driver_id): Path<String>,
    Query(page): Query<PageParams>,
) -> Result<Json<TripPage>, ApiError> {
    let (limit, offset) = page.resolve();
    let trips =
        query_handlers::get_trips_by_driver(&driver_id, limit, offset, state.read_model.as_ref())
            .await?;
    Ok(Json(TripPage {
        trips,
        limit,
        offset,
    }))
}

impl PageParams {
    fn resolve(&self) -> (u32, u32) {
        (
            self.limit.unwrap_or(DEFAULT_LIMIT),
            self.offset.unwrap_or_default(),
        )
    }
}

/// Returns the router for listing routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/riders/{rider_id}/trips", get(rider_trips))
        .route("/drivers/{driver_id}/trips", get(driver_trips))
}
