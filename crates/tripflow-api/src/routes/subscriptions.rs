//! Subscription hub introspection.

use axum::extract::State;
use axum::{Json, Router, routing::get};
use tripflow_trips::realtime::HubStats;

use crate::state::AppState;

/// GET /subscriptions/stats
async fn hub_stats(State(state): State<AppState>) -> Json<HubStats> {
    Json(state.service.hub().stats())
}

/// Returns the router for subscription routes.
pub fn router() -> Router<AppState> {
    Router::new().route("/stats", get(hub_stats))
}
