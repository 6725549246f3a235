//! # Gym Testing
//!
//! Testing utilities for the gym reservation engine.
//!
//! This crate provides:
//! - Deterministic clocks (`FixedClock`, `ManualClock`)
//! - Notifier doubles that record or reject notifications
//! - `FlakyStore`, a failure-injecting wrapper around any `ReservationStore`
//! - Fixture builders and proptest strategies for sessions and ledger operations
//!
//! ## Example
//!
//! ```
//! use gym_core::environment::Clock;
//! use gym_testing::{ManualClock, test_clock};
//! use chrono::Duration;
//!
//! let fixed = test_clock();
//! let clock = ManualClock::new(fixed.now());
//! clock.advance(Duration::hours(3));
//! assert_eq!(clock.now() - fixed.now(), Duration::hours(3));
//! ```

use chrono::{DateTime, Utc};
use gym_core::environment::Clock;

pub mod fixtures;
pub mod flaky_store;
pub mod notifiers;

/// Mock implementations of Environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::{Duration, TimeZone};
    use std::sync::{Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use gym_testing::mocks::FixedClock;
    /// use gym_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when a test moves it.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a clock frozen at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward (or backward, for a negative duration)
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute time
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (Monday 2030-01-07 08:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp is ambiguous, which it never is in UTC.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            Utc.with_ymd_and_hms(2030, 1, 7, 8, 0, 0)
                .single()
                .expect("hardcoded timestamp is unambiguous in UTC"),
        )
    }
}

// Re-export commonly used items
pub use fixtures::SessionSpecBuilder;
pub use flaky_store::FlakyStore;
pub use mocks::{FixedClock, ManualClock, test_clock};
pub use notifiers::{FailingNotifier, RecordingNotifier};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn test_manual_clock_moves_only_when_told() {
        let start = test_clock().now();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::minutes(121));
        assert_eq!(clock.now(), start + Duration::minutes(121));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
