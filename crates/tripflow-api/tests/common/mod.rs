//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::TimeZone;
use http_body_util::BodyExt;
use tower::ServiceExt;
use tripflow_core::clock::Clock;
use tripflow_core::repository::EventRepository;
use tripflow_test_support::{FixedClock, InMemoryEventRepository};
use tripflow_trips::application::read_model::InMemoryTripReadModel;
use tripflow_trips::realtime::HubConfig;

use tripflow_api::build_router;
use tripflow_api::state::AppState;

/// Fixed timestamp used across all integration tests.
fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        chrono::Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
    ))
}

/// Build the full app router over in-memory backends. Uses the same route
/// structure as `main.rs`.
pub fn build_test_app() -> Router {
    build_test_app_over(Arc::new(InMemoryEventRepository::new()))
}

/// Same as [`build_test_app`] with a caller-supplied event store.
pub fn build_test_app_over(events: Arc<dyn EventRepository>) -> Router {
    let state = AppState::new(
        events,
        Arc::new(InMemoryTripReadModel::new()),
        HubConfig::default(),
        3,
        fixed_clock(),
    );
    build_router(state)
}

/// Send a request with an optional JSON body and return the status and
/// decoded JSON response.
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<&serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

/// Send a POST request with a JSON body.
pub async fn post_json(
    app: &Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, "POST", uri, Some(body)).await
}

/// Send a GET request.
pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, "GET", uri, None).await
}

/// Request a trip for `rider_id` on the standard test route and return its id.
pub async fn request_trip(app: &Router, rider_id: &str) -> String {
    let (status, json) = post_json(
        app,
        "/api/v1/trips",
        &serde_json::json!({
            "rider_id": rider_id,
            "pickup": { "latitude": 40.71, "longitude": -74.00 },
            "destination": { "latitude": 40.75, "longitude": -73.98 },
            "vehicle_type": "comfort",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "request_trip failed: {json}");
    json["trip"]["id"].as_str().unwrap().to_owned()
}

/// Match `driver_id` to `trip_id` with a fixed fare.
pub async fn match_driver(app: &Router, trip_id: &str, driver_id: &str) -> (StatusCode, serde_json::Value) {
    post_json(
        app,
        &format!("/api/v1/trips/{trip_id}/match"),
        &serde_json::json!({
            "driver_id": driver_id,
            "vehicle_id": "v1",
            "eta_seconds": 180,
            "fare": 18.0,
        }),
    )
    .await
}
