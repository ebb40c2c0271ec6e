//! PostgreSQL trip projections.
//!
//! Stores folded trip snapshots in `trip_read_model` for the query side.

pub mod pg_trip_read_model;
