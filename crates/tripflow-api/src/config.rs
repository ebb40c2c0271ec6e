//! Server configuration, read once from the environment at startup.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tripflow_trips::application::command_handlers::DEFAULT_MAX_ATTEMPTS;
use tripflow_trips::realtime::{DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_QUEUE_CAPACITY, HubConfig};

use crate::error::AppError;

/// Runtime settings for the API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Upper bound on pooled database connections.
    pub database_max_connections: u32,
    /// Per-subscriber queue depth before updates are dropped.
    pub subscriber_queue_capacity: usize,
    /// Period between heartbeats on each update stream.
    pub heartbeat_interval: Duration,
    /// Attempts per command when versions collide.
    pub command_max_attempts: u32,
    /// Browser origins allowed by CORS; `None` allows any origin.
    pub cors_origins: Option<Vec<HeaderValue>>,
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is missing or any value
    /// fails to parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is missing or any value
    /// fails to parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL").ok_or_else(|| {
            AppError::Config("DATABASE_URL environment variable must be set".to_owned())
        })?;
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_owned());
        let port = parse_var(&lookup, "PORT", 3000)?;
        let database_max_connections = parse_var(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?;
        let subscriber_queue_capacity =
            parse_var(&lookup, "SUBSCRIBER_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?;
        let heartbeat_secs = parse_var(
            &lookup,
            "HEARTBEAT_INTERVAL_SECS",
            DEFAULT_HEARTBEAT_INTERVAL.as_secs(),
        )?;
        let command_max_attempts = parse_var(&lookup, "COMMAND_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        let cors_origins = lookup("CORS_ORIGINS")
            .map(|raw| parse_origins(&raw))
            .transpose()?
            .flatten();

        for (name, is_zero) in [
            ("DATABASE_MAX_CONNECTIONS", database_max_connections == 0),
            ("SUBSCRIBER_QUEUE_CAPACITY", subscriber_queue_capacity == 0),
            ("HEARTBEAT_INTERVAL_SECS", heartbeat_secs == 0),
            ("COMMAND_MAX_ATTEMPTS", command_max_attempts == 0),
        ] {
            if is_zero {
                return Err(AppError::Config(format!("{name} must be greater than zero")));
            }
        }

        Ok(Self {
            database_url,
            host,
            port,
            database_max_connections,
            subscriber_queue_capacity,
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            command_max_attempts,
            cors_origins,
        })
    }

    /// `HOST:PORT` for the listener.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Subscription hub settings.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            queue_capacity: self.subscriber_queue_capacity,
            heartbeat_interval: self.heartbeat_interval,
        }
    }

    /// CORS policy for the router. Restricted origins may only send the
    /// JSON commands and read the update streams.
    #[must_use]
    pub fn cors_layer(&self) -> CorsLayer {
        match &self.cors_origins {
            None => CorsLayer::permissive(),
            Some(origins) => CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins.iter().cloned()))
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([CONTENT_TYPE]),
        }
    }
}

/// Comma-separated origins. `*` or an empty list means any origin.
fn parse_origins(raw: &str) -> Result<Option<Vec<HeaderValue>>, AppError> {
    let entries: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect();
    if entries.is_empty() || entries == ["*"] {
        return Ok(None);
    }
    entries
        .into_iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|e| {
                AppError::Config(format!("CORS_ORIGINS entry {origin:?} is invalid: {e}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{name} is invalid ({raw:?}): {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_apply_when_only_database_url_is_set() {
        let config =
            AppConfig::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://db/trips")]))
                .unwrap();

        assert_eq!(config.database_url, "postgres://db/trips");
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.subscriber_queue_capacity, 64);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.command_max_attempts, 3);
        assert!(config.cors_origins.is_none());
    }

    #[test]
    fn test_cors_origins_are_split_and_trimmed() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/trips"),
            (
                "CORS_ORIGINS",
                "https://rider.example.com, https://ops.example.com,",
            ),
        ]))
        .unwrap();

        assert_eq!(
            config.cors_origins,
            Some(vec![
                HeaderValue::from_static("https://rider.example.com"),
                HeaderValue::from_static("https://ops.example.com"),
            ])
        );
    }

    #[tokio::test]
    async fn test_restricted_cors_layer_only_echoes_listed_origins() {
        use axum::body::Body;
        use axum::http::Request;
        use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN};
        use axum::routing::get;
        use tower::ServiceExt;

        // Arrange
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/trips"),
            ("CORS_ORIGINS", "https://rider.example.com"),
        ]))
        .unwrap();
        let app = axum::Router::new()
            .route("/health", get(|| async { "ok" }))
            .layer(config.cors_layer());
        let from = |origin: &'static str| {
            Request::builder()
                .uri("/health")
                .header(ORIGIN, origin)
                .body(Body::empty())
                .unwrap()
        };

        // Act
        let listed = app.clone().oneshot(from("https://rider.example.com")).await.unwrap();
        let other = app.oneshot(from("https://evil.example.com")).await.unwrap();

        // Assert
        assert_eq!(
            listed.headers()[ACCESS_CONTROL_ALLOW_ORIGIN].to_str().unwrap(),
            "https://rider.example.com"
        );
        assert!(other.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[test]
    fn test_wildcard_cors_origin_allows_any() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/trips"),
            ("CORS_ORIGINS", "*"),
        ]))
        .unwrap();

        assert!(config.cors_origins.is_none());
    }

    #[test]
    fn test_cors_origin_with_control_character_is_rejected() {
        let result = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/trips"),
            ("CORS_ORIGINS", "https://ok.example.com,bad\norigin"),
        ]));

        match result {
            Err(AppError::Config(message)) => assert!(message.contains("CORS_ORIGINS")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/trips"),
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("SUBSCRIBER_QUEUE_CAPACITY", "8"),
            ("HEARTBEAT_INTERVAL_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        let hub = config.hub_config();
        assert_eq!(hub.queue_capacity, 8);
        assert_eq!(hub.heartbeat_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_database_url_is_config_error() {
        let result = AppConfig::from_lookup(lookup_from(&[]));

        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_unparseable_port_is_config_error() {
        let result = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/trips"),
            ("PORT", "eighty"),
        ]));

        match result {
            Err(AppError::Config(message)) => assert!(message.contains("PORT")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_queue_capacity_is_rejected() {
        let result = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/trips"),
            ("SUBSCRIBER_QUEUE_CAPACITY", "0"),
        ]));

        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
