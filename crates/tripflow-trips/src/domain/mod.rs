//! Domain model for the Trip Lifecycle context.

pub mod aggregates;
pub mod commands;
pub mod events;
pub mod location;
pub mod ports;
pub mod states;
