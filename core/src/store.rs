//! Persistence collaborator for sessions and reservations.
//!
//! The engine never talks to a database directly. It writes through
//! [`ReservationStore`], which is expected to offer read-your-writes consistency:
//! a `save_*` followed by a `load_*` from the same caller observes the write.
//!
//! # Implementations
//!
//! - `InMemoryReservationStore` (in `gym-reservations`): map-backed store used by the demo and tests
//! - `FlakyStore` (in `gym-testing`): wraps any store and injects write failures
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the store can
//! be held as `Arc<dyn ReservationStore>` by every engine component.

use crate::types::{GymSession, Reservation, ReservationId, SessionId, UserId};
use chrono::NaiveDate;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`ReservationStore`] methods
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors reported by a persistence collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend rejected or failed the operation
    #[error("Backend error: {0}")]
    Backend(String),

    /// The backend could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Durable storage for sessions and reservations.
///
/// Loads return `Ok(None)` or an empty vector for unknown ids; "not found" is
/// decided by the engine, not the store.
pub trait ReservationStore: Send + Sync {
    /// Load one session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn load_session(&self, id: SessionId) -> StoreFuture<'_, Option<GymSession>>;

    /// Load every session scheduled on `date`, closed ones included.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn load_sessions_on(&self, date: NaiveDate) -> StoreFuture<'_, Vec<GymSession>>;

    /// Insert or replace a session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn save_session(&self, session: GymSession) -> StoreFuture<'_, ()>;

    /// Load one reservation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn load_reservation(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>>;

    /// Load all reservations (any status) for a session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn load_reservations_by_session(&self, id: SessionId) -> StoreFuture<'_, Vec<Reservation>>;

    /// Load all reservations (any status) held by a user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn load_reservations_by_user(&self, id: UserId) -> StoreFuture<'_, Vec<Reservation>>;

    /// Insert or replace a reservation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn save_reservation(&self, reservation: Reservation) -> StoreFuture<'_, ()>;
}
