//! Tripflow API: HTTP commands, queries, and live SSE trip updates.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::Router;

use crate::state::AppState;

/// Builds the application router: `/health` and `/ready` at the root and
/// everything else under `/api/v1`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest(
            "/api/v1",
            Router::new()
                .nest("/trips", routes::trips::router())
                .merge(routes::listings::router())
                .nest("/subscriptions", routes::subscriptions::router()),
        )
        .with_state(state)
}
