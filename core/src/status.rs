//! Reservation status state machine.
//!
//! ```text
//! Pending ──► Confirmed ──► Completed
//!    │            │
//!    │            ├───────► Missed
//!    ▼            ▼
//!  Cancelled ◄────┘
//! ```
//!
//! `Cancelled`, `Completed` and `Missed` are terminal. Every status change in the
//! engine goes through [`ReservationStatus::transition`], which consults the single
//! [`TRANSITIONS`] table.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Reservation status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    /// Created, awaiting confirmation
    Pending,
    /// Holding a slot
    Confirmed,
    /// Member attended
    Completed,
    /// Cancelled before the session
    Cancelled,
    /// Member did not show up
    Missed,
}

/// Every permitted `(from, to)` pair.
pub const TRANSITIONS: &[(ReservationStatus, ReservationStatus)] = &[
    (ReservationStatus::Pending, ReservationStatus::Confirmed),
    (ReservationStatus::Pending, ReservationStatus::Cancelled),
    (ReservationStatus::Confirmed, ReservationStatus::Cancelled),
    (ReservationStatus::Confirmed, ReservationStatus::Completed),
    (ReservationStatus::Confirmed, ReservationStatus::Missed),
];

/// A transition not present in [`TRANSITIONS`]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid status transition: {from} -> {to}")]
pub struct InvalidTransition {
    /// Current status
    pub from: ReservationStatus,
    /// Requested status
    pub to: ReservationStatus,
}

impl ReservationStatus {
    /// Active reservations count against the per-user limit and can still be cancelled
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    /// Holds a seat in the session's reserved-spot counter.
    ///
    /// Attendance keeps the seat: only cancellation gives it back.
    #[must_use]
    pub const fn holds_slot(self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// No transition leaves a terminal status
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Missed)
    }

    /// Checks the transition table
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        TRANSITIONS
            .iter()
            .any(|&(from, target)| from == self && target == to)
    }

    /// Returns the new status if `self -> to` is permitted.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] for any pair missing from [`TRANSITIONS`].
    pub fn transition(self, to: Self) -> Result<Self, InvalidTransition> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }

    /// Upper-case name as stored and returned to callers
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Missed => "MISSED",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ALL: [ReservationStatus; 5] = [
        ReservationStatus::Pending,
        ReservationStatus::Confirmed,
        ReservationStatus::Completed,
        ReservationStatus::Cancelled,
        ReservationStatus::Missed,
    ];

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(
                    from.transition(to).is_err(),
                    "{from} -> {to} should be rejected"
                );
            }
        }
    }

    #[test]
    fn test_active_and_terminal_partition_statuses() {
        for status in ALL {
            assert_ne!(status.is_active(), status.is_terminal());
        }
    }

    #[test]
    fn test_only_cancelled_gives_the_slot_back() {
        let holding: Vec<_> = ALL.into_iter().filter(|s| s.holds_slot()).collect();
        assert_eq!(
            holding,
            vec![
                ReservationStatus::Pending,
                ReservationStatus::Confirmed,
                ReservationStatus::Completed,
                ReservationStatus::Missed,
            ]
        );
        for status in ALL.iter().filter(|s| s.is_active()) {
            assert!(status.holds_slot());
        }
    }

    #[test]
    fn test_missed_only_from_confirmed() {
        assert!(ReservationStatus::Confirmed.can_transition_to(ReservationStatus::Missed));
        assert!(!ReservationStatus::Pending.can_transition_to(ReservationStatus::Missed));
        assert!(!ReservationStatus::Pending.can_transition_to(ReservationStatus::Completed));
    }

    #[test]
    fn test_invalid_transition_reports_both_ends() {
        let err = ReservationStatus::Cancelled
            .transition(ReservationStatus::Confirmed)
            .unwrap_err();
        assert_eq!(err.from, ReservationStatus::Cancelled);
        assert_eq!(err.to, ReservationStatus::Confirmed);
        assert_eq!(
            err.to_string(),
            "Invalid status transition: CANCELLED -> CONFIRMED"
        );
    }
}
