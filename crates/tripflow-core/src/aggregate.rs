//! Event-folded aggregates.

use uuid::Uuid;

use crate::event::DomainEvent;

/// State derived purely by folding a stream's events in version order.
///
/// Nothing mutates an aggregate except `apply`, and `apply` only ever sees
/// events that were already appended.
pub trait AggregateRoot: Send + Sync {
    /// The event type of this aggregate's stream.
    type Event: DomainEvent;

    /// Stream identifier.
    fn aggregate_id(&self) -> Uuid;

    /// Number of events folded so far.
    fn version(&self) -> i64;

    /// Folds one event.
    fn apply(&mut self, event: &Self::Event);

    /// Folds `events` in order.
    fn apply_all<'a, I>(&mut self, events: I)
    where
        I: IntoIterator<Item = &'a Self::Event>,
        Self::Event: 'a,
    {
        for event in events {
            self.apply(event);
        }
    }

    /// Version the next appended event must carry.
    fn next_version(&self) -> i64 {
        self.version() + 1
    }
}
