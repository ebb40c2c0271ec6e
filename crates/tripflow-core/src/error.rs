//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Malformed or out-of-range input.
    #[error("validation error: {0}")]
    Validation(String),

    /// The requested state change is not allowed from the current state.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// The state the aggregate is currently in.
        from: String,
        /// The state the command tried to move to.
        to: String,
    },

    /// A business-level conflict, such as a rider that already has an
    /// active trip or a driver that is already busy.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Optimistic concurrency conflict.
    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// An aggregate was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// The caller is not a party allowed to act on the aggregate.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A synchronous collaborator (geo, pricing) failed.
    #[error("dependency error: {0}")]
    Dependency(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Returns `true` for version collisions that a fresh re-read may resolve.
    #[must_use]
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}
