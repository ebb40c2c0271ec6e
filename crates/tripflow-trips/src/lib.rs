//! Trip Lifecycle bounded context.
//!
//! Responsible for the event-sourced trip aggregate, its state machine,
//! the materialized trip read model, and the real-time fan-out of trip
//! updates to stream subscribers.

pub mod application;
pub mod domain;
pub mod realtime;
