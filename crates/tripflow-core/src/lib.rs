//! Event-sourcing primitives for tripflow.
//!
//! Streams, envelopes, the append contract with its optimistic version check,
//! and the error taxonomy every layer maps onto. No I/O lives here; storage
//! backends implement [`repository::EventRepository`].

pub mod aggregate;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod repository;
