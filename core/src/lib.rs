//! # Gym Core
//!
//! Domain types, validators and collaborator traits for the gym reservation engine.
//!
//! This crate is the functional core: it holds no shared mutable state and performs no I/O.
//! Everything that touches concurrency or persistence lives in `gym-reservations`, which
//! drives these types through the collaborator traits defined here.
//!
//! ## Core Concepts
//!
//! - **Session**: a scheduled, capacity-bounded time slot led by a trainer
//! - **Reservation**: a member's claim on one slot of a session, optionally with equipment
//! - **Status**: the reservation state machine with a single transition table
//! - **Validators**: pure checks on time windows, lead time, cancellation window, capacity
//! - **Environment**: injected dependencies (`Clock`, `ReservationStore`, `Notifier`)
//!
//! ## Example
//!
//! ```
//! use gym_core::status::ReservationStatus;
//!
//! let status = ReservationStatus::Pending
//!     .transition(ReservationStatus::Confirmed)
//!     .unwrap();
//! assert!(status.is_active());
//! assert!(status.transition(ReservationStatus::Pending).is_err());
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

pub mod error;
pub mod notifier;
pub mod status;
pub mod store;
pub mod types;
pub mod validation;

pub use error::{ErrorKind, ReservationError};
pub use status::ReservationStatus;

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected into the
/// engine components, so production code and tests differ only in what they pass in.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use gym_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = chrono::Utc::now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time source used in production.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
