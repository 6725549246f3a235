//! Caller-facing error taxonomy.
//!
//! Every failure the engine can report is a [`ReservationError`] variant. Variants
//! are grouped into an [`ErrorKind`] so callers can map them to transport status
//! codes without matching every case, and [`ReservationError::code`] gives a stable
//! snake-case label for logs and metrics.

use crate::status::ReservationStatus;
use crate::store::StoreError;
use crate::types::{ConflictResource, EquipmentId, ReservationId, SessionId, UserId};
use crate::validation::ValidationError;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use thiserror::Error;

/// Category of a [`ReservationError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input, caller's fault
    Validation,
    /// A business rule rejected the request
    BusinessRule,
    /// A shared resource is exhausted or already claimed
    Contention,
    /// Referenced entity does not exist
    NotFound,
    /// The request does not fit the current reservation status (stale client view)
    StateMachine,
    /// Internal lock contention exhausted the retry budget
    Concurrency,
    /// Persistence or runtime failure
    Infrastructure,
}

/// Errors surfaced by the reservation engine.
#[derive(Error, Debug)]
pub enum ReservationError {
    /// Session end is not after its start
    #[error("Invalid time window: end {end} is not after start {start}")]
    InvalidTime {
        /// Requested start
        start: NaiveTime,
        /// Requested end
        end: NaiveTime,
    },

    /// Session date lies in the past
    #[error("Invalid date: {date} is before today ({today})")]
    InvalidDate {
        /// Requested date
        date: NaiveDate,
        /// Current date
        today: NaiveDate,
    },

    /// Capacity is zero or negative
    #[error("Invalid capacity: {capacity} (must be greater than zero)")]
    InvalidCapacity {
        /// Requested capacity
        capacity: i64,
    },

    /// Reservation attempted for a session that has already started
    #[error("Session starting at {starts_at} has already started")]
    PastDate {
        /// Session start
        starts_at: DateTime<Utc>,
    },

    /// Cancellation attempted after the session started
    #[error("Reservation {reservation_id} is for a session that started at {starts_at}")]
    PastReservation {
        /// Reservation being cancelled
        reservation_id: ReservationId,
        /// Session start
        starts_at: DateTime<Utc>,
    },

    /// Cancellation attempted inside the cancellation window
    #[error(
        "Cancellation rejected: session starts at {starts_at}, less than {window_minutes} minutes from now"
    )]
    LateCancellation {
        /// Session start
        starts_at: DateTime<Utc>,
        /// Configured window in minutes
        window_minutes: i64,
    },

    /// New session overlaps an existing one on trainer or location
    #[error("Schedule conflict with session {conflicting}: same {resource}")]
    ScheduleConflict {
        /// Existing session
        conflicting: SessionId,
        /// Shared resource
        resource: ConflictResource,
    },

    /// No free slot left in the session
    #[error("Session {session_id} is full (capacity {capacity})")]
    CapacityExceeded {
        /// Full session
        session_id: SessionId,
        /// Its capacity
        capacity: u32,
    },

    /// The user already holds an active reservation for the session
    #[error("User {user_id} already holds reservation {existing} for session {session_id}")]
    DuplicateReservation {
        /// User
        user_id: UserId,
        /// Session
        session_id: SessionId,
        /// The active reservation
        existing: ReservationId,
    },

    /// The user is at the active-reservation limit
    #[error("User {user_id} has {active} active reservations (limit {limit})")]
    ReservationLimitExceeded {
        /// User
        user_id: UserId,
        /// Configured limit
        limit: u32,
        /// Current active count
        active: u32,
    },

    /// None of the requested equipment could be bound
    #[error("None of the requested equipment is available: {requested:?}")]
    NoEquipmentAvailable {
        /// Requested items
        requested: Vec<EquipmentId>,
    },

    /// Unknown session
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Unknown reservation
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// Session is soft-closed and accepts no new reservations
    #[error("Session {0} is closed")]
    SessionClosed(SessionId),

    /// Reservation was already cancelled
    #[error("Reservation {0} is already cancelled")]
    AlreadyCancelled(ReservationId),

    /// Operation not permitted in the reservation's current status
    #[error("Cannot {operation} reservation {reservation_id} in status {status}")]
    InvalidState {
        /// Reservation
        reservation_id: ReservationId,
        /// Its current status
        status: ReservationStatus,
        /// Attempted operation
        operation: &'static str,
    },

    /// Lock acquisition kept timing out
    #[error("Timed out acquiring {resource} after {attempts} attempts")]
    ConcurrencyTimeout {
        /// Contended resource
        resource: String,
        /// Attempts made
        attempts: usize,
    },

    /// Persistence collaborator failure
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// The detached commit task failed to run to completion
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReservationError {
    /// Category of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTime { .. } | Self::InvalidDate { .. } | Self::InvalidCapacity { .. } => {
                ErrorKind::Validation
            }
            Self::PastDate { .. }
            | Self::PastReservation { .. }
            | Self::LateCancellation { .. }
            | Self::SessionClosed(_) => ErrorKind::BusinessRule,
            Self::ScheduleConflict { .. }
            | Self::CapacityExceeded { .. }
            | Self::DuplicateReservation { .. }
            | Self::ReservationLimitExceeded { .. }
            | Self::NoEquipmentAvailable { .. } => ErrorKind::Contention,
            Self::SessionNotFound(_) | Self::ReservationNotFound(_) => ErrorKind::NotFound,
            Self::AlreadyCancelled(_) | Self::InvalidState { .. } => ErrorKind::StateMachine,
            Self::ConcurrencyTimeout { .. } => ErrorKind::Concurrency,
            Self::Storage(_) | Self::Internal(_) => ErrorKind::Infrastructure,
        }
    }

    /// Whether the whole operation may safely be retried by the caller as-is
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyTimeout { .. })
    }

    /// Stable label used in logs and metrics
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidTime { .. } => "invalid_time",
            Self::InvalidDate { .. } => "invalid_date",
            Self::InvalidCapacity { .. } => "invalid_capacity",
            Self::PastDate { .. } => "past_date",
            Self::PastReservation { .. } => "past_reservation",
            Self::LateCancellation { .. } => "late_cancellation",
            Self::ScheduleConflict { .. } => "schedule_conflict",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::DuplicateReservation { .. } => "duplicate_reservation",
            Self::ReservationLimitExceeded { .. } => "reservation_limit_exceeded",
            Self::NoEquipmentAvailable { .. } => "no_equipment_available",
            Self::SessionNotFound(_) => "session_not_found",
            Self::ReservationNotFound(_) => "reservation_not_found",
            Self::SessionClosed(_) => "session_closed",
            Self::AlreadyCancelled(_) => "already_cancelled",
            Self::InvalidState { .. } => "invalid_state",
            Self::ConcurrencyTimeout { .. } => "concurrency_timeout",
            Self::Storage(_) => "storage",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<ValidationError> for ReservationError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::InvalidTime { start, end } => Self::InvalidTime { start, end },
            ValidationError::InvalidDate { date, today } => Self::InvalidDate { date, today },
            ValidationError::InvalidCapacity { capacity } => Self::InvalidCapacity { capacity },
            ValidationError::PastDate { starts_at } => Self::PastDate { starts_at },
            ValidationError::LateCancellation {
                starts_at,
                window_minutes,
            } => Self::LateCancellation {
                starts_at,
                window_minutes,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_concurrency_timeout_is_retryable() {
        let timeout = ReservationError::ConcurrencyTimeout {
            resource: "session".to_string(),
            attempts: 4,
        };
        assert!(timeout.is_retryable());
        assert_eq!(timeout.kind(), ErrorKind::Concurrency);

        let full = ReservationError::CapacityExceeded {
            session_id: SessionId::new(),
            capacity: 1,
        };
        assert!(!full.is_retryable());
        assert_eq!(full.kind(), ErrorKind::Contention);
        assert_eq!(full.code(), "capacity_exceeded");
    }

    #[test]
    fn test_validation_error_keeps_its_kind() {
        let err: ReservationError = ValidationError::InvalidCapacity { capacity: 0 }.into();
        assert!(matches!(
            err,
            ReservationError::InvalidCapacity { capacity: 0 }
        ));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_storage_errors_are_infrastructure() {
        let err: ReservationError = StoreError::Unavailable("down".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert_eq!(err.to_string(), "Storage error: Store unavailable: down");
    }
}
