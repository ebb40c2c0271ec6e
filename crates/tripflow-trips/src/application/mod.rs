//! Application services for the Trip Lifecycle context.

pub mod collaborators;
pub mod command_handlers;
pub mod locks;
pub mod query_handlers;
pub mod read_model;
