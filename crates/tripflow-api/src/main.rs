//! Tripflow API server entry point.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tripflow_api::build_router;
use tripflow_api::config::AppConfig;
use tripflow_api::error::AppError;
use tripflow_api::state::AppState;
use tripflow_core::clock::SystemClock;
use tripflow_event_store::pg_event_repository::PgEventRepository;
use tripflow_projections::pg_trip_read_model::PgTripReadModel;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env()?;
    info!(
        queue_capacity = config.subscriber_queue_capacity,
        heartbeat_secs = config.heartbeat_interval.as_secs(),
        cors_restricted = config.cors_origins.is_some(),
        "starting tripflow API server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;

    let app_state = AppState::new(
        Arc::new(PgEventRepository::new(pool.clone())),
        Arc::new(PgTripReadModel::new(pool)),
        config.hub_config(),
        config.command_max_attempts,
        Arc::new(SystemClock),
    );

    let app = build_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(config.cors_layer());

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
