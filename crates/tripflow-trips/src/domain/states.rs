//! Trip lifecycle states and the transition table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tripflow_core::error::DomainError;

/// Lifecycle state of a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripState {
    /// The rider has asked for a trip.
    Requested,
    /// Dispatch is searching for a driver.
    Matching,
    /// A driver has accepted the trip.
    Matched,
    /// The driver is heading to the pickup point.
    DriverEnRoute,
    /// The driver is waiting at the pickup point.
    DriverArrived,
    /// The rider is on board.
    Started,
    /// The trip is under way.
    InProgress,
    /// The trip ended normally.
    Completed,
    /// The rider or driver called the trip off.
    Cancelled,
    /// The trip could not be fulfilled.
    Failed,
    /// A completed trip is under dispute.
    Disputed,
}

impl TripState {
    /// Every state, in lifecycle order.
    pub const ALL: [Self; 11] = [
        Self::Requested,
        Self::Matching,
        Self::Matched,
        Self::DriverEnRoute,
        Self::DriverArrived,
        Self::Started,
        Self::InProgress,
        Self::Completed,
        Self::Cancelled,
        Self::Failed,
        Self::Disputed,
    ];

    /// Persistent name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Matching => "matching",
            Self::Matched => "matched",
            Self::DriverEnRoute => "driver_en_route",
            Self::DriverArrived => "driver_arrived",
            Self::Started => "started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Disputed => "disputed",
        }
    }

    /// Trip closure states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Every non-terminal state, `Disputed` included. A rider holds at most
    /// one active trip.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// States in which the matched driver is still working the trip. A driver
    /// is busy only here; a disputed trip no longer occupies its driver.
    #[must_use]
    pub const fn is_post_match_active(self) -> bool {
        matches!(
            self,
            Self::Matched
                | Self::DriverEnRoute
                | Self::DriverArrived
                | Self::Started
                | Self::InProgress
        )
    }

    /// Optional progress states a trip may move through without stopping.
    const fn is_progress_marker(self) -> bool {
        matches!(
            self,
            Self::Matching | Self::DriverEnRoute | Self::DriverArrived
        )
    }

    /// Names of the terminal states, for storage-level filters.
    #[must_use]
    pub fn terminal_names() -> Vec<&'static str> {
        Self::names_where(Self::is_terminal)
    }

    /// Names of the states in which a driver is busy.
    #[must_use]
    pub fn post_match_active_names() -> Vec<&'static str> {
        Self::names_where(Self::is_post_match_active)
    }

    fn names_where(pred: fn(Self) -> bool) -> Vec<&'static str> {
        Self::ALL
            .into_iter()
            .filter(|s| pred(*s))
            .map(Self::as_str)
            .collect()
    }
}

impl fmt::Display for TripState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| DomainError::Validation(format!("unknown trip state: {s}")))
    }
}

/// Allowed transitions, one row per source state. States without a row have
/// no outgoing edges.
const TRANSITIONS: &[(TripState, &[TripState])] = &[
    (
        TripState::Requested,
        &[TripState::Matching, TripState::Cancelled],
    ),
    (
        TripState::Matching,
        &[TripState::Matched, TripState::Cancelled, TripState::Failed],
    ),
    (
        TripState::Matched,
        &[TripState::DriverEnRoute, TripState::Cancelled],
    ),
    (
        TripState::DriverEnRoute,
        &[TripState::DriverArrived, TripState::Cancelled],
    ),
    (
        TripState::DriverArrived,
        &[TripState::Started, TripState::Cancelled],
    ),
    (
        TripState::Started,
        &[TripState::InProgress, TripState::Cancelled],
    ),
    (
        TripState::InProgress,
        &[TripState::Completed, TripState::Cancelled, TripState::Failed],
    ),
    (TripState::Completed, &[TripState::Disputed]),
    (TripState::Disputed, &[TripState::Completed]),
];

/// Pure transition-validity checks over [`TRANSITIONS`].
#[derive(Debug, Clone, Copy)]
pub struct StateMachine;

impl StateMachine {
    /// States reachable from `from` in one step.
    #[must_use]
    pub fn allowed_transitions(from: TripState) -> &'static [TripState] {
        TRANSITIONS
            .iter()
            .find(|(source, _)| *source == from)
            .map_or(&[] as &[TripState], |&(_, targets)| targets)
    }

    /// Whether the table contains the edge `from -> to`.
    #[must_use]
    pub fn can_transition(from: TripState, to: TripState) -> bool {
        Self::allowed_transitions(from).contains(&to)
    }

    /// Whether `to` is reachable from `from` either directly or by passing
    /// only through progress markers (matching, en route, arrived).
    #[must_use]
    pub fn can_advance(from: TripState, to: TripState) -> bool {
        let mut pending = vec![from];
        let mut seen = vec![from];
        while let Some(state) = pending.pop() {
            for &next in Self::allowed_transitions(state) {
                if next == to {
                    return true;
                }
                if next.is_progress_marker() && !seen.contains(&next) {
                    seen.push(next);
                    pending.push(next);
                }
            }
        }
        false
    }

    /// Like [`StateMachine::can_transition`], as a `Result`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` if the edge is not in the table.
    pub fn ensure_transition(from: TripState, to: TripState) -> Result<(), DomainError> {
        if Self::can_transition(from, to) {
            Ok(())
        } else {
            Err(invalid(from, to))
        }
    }

    /// Like [`StateMachine::can_advance`], as a `Result`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` if `to` is not reachable.
    pub fn ensure_advance(from: TripState, to: TripState) -> Result<(), DomainError> {
        if Self::can_advance(from, to) {
            Ok(())
        } else {
            Err(invalid(from, to))
        }
    }
}

fn invalid(from: TripState, to: TripState) -> DomainError {
    DomainError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}
