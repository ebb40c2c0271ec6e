//! Shared test doubles and utilities for the tripflow trip lifecycle engine.

mod clock;
mod repository;

pub use clock::{FixedClock, SteppingClock};
pub use repository::{ConflictingEventRepository, FailingEventRepository, InMemoryEventRepository};
