//! Commands.

use uuid::Uuid;

/// A request to change one aggregate.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// Dotted name for logs, e.g. `trip.cancel`.
    fn command_type(&self) -> &'static str;

    /// Copied onto every event the command produces.
    fn correlation_id(&self) -> Uuid;

    /// The rider or driver issuing the command; `None` for system commands,
    /// whose events carry no user attribution.
    fn actor_id(&self) -> Option<&str>;

    /// `true` for commands issued by the platform rather than a user.
    fn is_system(&self) -> bool {
        self.actor_id().is_none()
    }
}
