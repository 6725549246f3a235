//! Pure time and capacity validators.
//!
//! None of these functions read the clock or touch shared state: "now" and "today"
//! are always passed in, so the same inputs always produce the same answer.

use crate::types::{Capacity, session_instant};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use thiserror::Error;

/// Default cancellation window in minutes
pub const DEFAULT_CANCELLATION_WINDOW_MINUTES: i64 = 120;

/// Default cancellation window
#[must_use]
pub const fn default_cancellation_window() -> Duration {
    Duration::minutes(DEFAULT_CANCELLATION_WINDOW_MINUTES)
}

/// Validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `end <= start`
    #[error("end time {end} is not after start time {start}")]
    InvalidTime {
        /// Start time
        start: NaiveTime,
        /// End time
        end: NaiveTime,
    },

    /// Date before today
    #[error("date {date} is before {today}")]
    InvalidDate {
        /// Requested date
        date: NaiveDate,
        /// Current date
        today: NaiveDate,
    },

    /// Capacity `<= 0`
    #[error("capacity {capacity} must be positive")]
    InvalidCapacity {
        /// Requested capacity
        capacity: i64,
    },

    /// Session already started
    #[error("session started at {starts_at}")]
    PastDate {
        /// Session start
        starts_at: DateTime<Utc>,
    },

    /// Inside the cancellation window
    #[error("session at {starts_at} is within the {window_minutes} minute cancellation window")]
    LateCancellation {
        /// Session start
        starts_at: DateTime<Utc>,
        /// Window in minutes
        window_minutes: i64,
    },
}

/// Checks a proposed session window.
///
/// # Errors
///
/// - [`ValidationError::InvalidTime`] if `end <= start`
/// - [`ValidationError::InvalidDate`] if `date` is before `today`
pub fn validate_session_window(
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    today: NaiveDate,
) -> Result<(), ValidationError> {
    if end <= start {
        return Err(ValidationError::InvalidTime { start, end });
    }
    if date < today {
        return Err(ValidationError::InvalidDate { date, today });
    }
    Ok(())
}

/// Checks that the session has not started yet.
///
/// # Errors
///
/// Returns [`ValidationError::PastDate`] if the session start is at or before `now`.
pub fn validate_reservation_lead_time(
    session_date: NaiveDate,
    session_start: NaiveTime,
    now: DateTime<Utc>,
) -> Result<(), ValidationError> {
    let starts_at = session_instant(session_date, session_start);
    if starts_at <= now {
        return Err(ValidationError::PastDate { starts_at });
    }
    Ok(())
}

/// Checks that a cancellation happens at least `window` before the session starts.
///
/// Exactly `window` ahead is still allowed. There is no override.
///
/// # Errors
///
/// Returns [`ValidationError::LateCancellation`] if `session_start - now < window`.
pub fn validate_cancellation_window(
    session_start: DateTime<Utc>,
    now: DateTime<Utc>,
    window: Duration,
) -> Result<(), ValidationError> {
    if session_start - now < window {
        return Err(ValidationError::LateCancellation {
            starts_at: session_start,
            window_minutes: window.num_minutes(),
        });
    }
    Ok(())
}

/// Turns a caller-supplied capacity into a [`Capacity`].
///
/// # Errors
///
/// Returns [`ValidationError::InvalidCapacity`] if `capacity <= 0` or does not fit in `u32`.
pub fn validate_capacity(capacity: i64) -> Result<Capacity, ValidationError> {
    u32::try_from(capacity)
        .ok()
        .and_then(Capacity::new)
        .ok_or(ValidationError::InvalidCapacity { capacity })
}
