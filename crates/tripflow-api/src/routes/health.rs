//! Liveness and readiness checks.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Open update streams across all trips.
    pub live_subscribers: usize,
    pub dropped_updates: u64,
}

/// Readiness of each backing store.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub event_store: bool,
    pub read_model: bool,
}

async fn liveness(State(state): State<AppState>) -> Json<LivenessResponse> {
    let stats = state.service.hub().stats();
    Json(LivenessResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        live_subscribers: stats.subscribers,
        dropped_updates: stats.dropped_updates,
    })
}

/// Checks both stores with a lookup of the nil trip id, which never exists.
async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let event_store = match state.event_repository.get_events(Uuid::nil()).await {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "event store not ready");
            false
        }
    };
    let read_model = match state.read_model.get_trip(Uuid::nil()).await {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "read model not ready");
            false
        }
    };
    let ready = event_store && read_model;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadinessResponse {
            ready,
            event_store,
            read_model,
        }),
    )
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(liveness))
        .route("/ready", get(readiness))
}
