//! PostgreSQL event store for tripflow.
//!
//! Persists trip event streams in the `trip_events` table with optimistic
//! concurrency on `(trip_id, version)`.

pub mod pg_event_repository;
