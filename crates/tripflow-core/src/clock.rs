//! Time source for event timestamps and fare quotes.
//!
//! Stream order is by version, never by `occurred_at`.

use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Injected wall clock. Tests pin or step it.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        C::now(self)
    }
}
