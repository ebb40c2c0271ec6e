//! Route modules.

pub mod health;
pub mod listings;
pub mod subscriptions;
pub mod trips;
