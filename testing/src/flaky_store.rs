//! Failure injection around a persistence collaborator.
//!
//! [`FlakyStore`] delegates to an inner store but can be told to fail the next N
//! session or reservation writes, or every read. Used to exercise the rollback
//! paths of the reservation ledger.

use gym_core::store::{ReservationStore, StoreError, StoreFuture};
use gym_core::types::{GymSession, Reservation, ReservationId, SessionId, UserId};
use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Store wrapper that fails on demand.
#[derive(Debug)]
pub struct FlakyStore<S> {
    inner: S,
    failing_session_saves: AtomicUsize,
    failing_reservation_saves: AtomicUsize,
    reads_down: AtomicBool,
    session_saves: AtomicUsize,
    reservation_saves: AtomicUsize,
}

impl<S> FlakyStore<S> {
    /// Wrap `inner` with no failures scheduled
    #[must_use]
    pub const fn new(inner: S) -> Self {
        Self {
            inner,
            failing_session_saves: AtomicUsize::new(0),
            failing_reservation_saves: AtomicUsize::new(0),
            reads_down: AtomicBool::new(false),
            session_saves: AtomicUsize::new(0),
            reservation_saves: AtomicUsize::new(0),
        }
    }

    /// The wrapped store
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    /// Fail the next `count` calls to `save_session`
    pub fn fail_next_session_saves(&self, count: usize) {
        self.failing_session_saves.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` calls to `save_reservation`
    pub fn fail_next_reservation_saves(&self, count: usize) {
        self.failing_reservation_saves.store(count, Ordering::SeqCst);
    }

    /// Make every load fail until switched back
    pub fn set_reads_down(&self, down: bool) {
        self.reads_down.store(down, Ordering::SeqCst);
    }

    /// Successful `save_session` calls so far
    pub fn session_saves(&self) -> usize {
        self.session_saves.load(Ordering::SeqCst)
    }

    /// Successful `save_reservation` calls so far
    pub fn reservation_saves(&self) -> usize {
        self.reservation_saves.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.reads_down.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected read failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl<S: ReservationStore> ReservationStore for FlakyStore<S> {
    fn load_session(&self, id: SessionId) -> StoreFuture<'_, Option<GymSession>> {
        Box::pin(async move {
            self.check_reads()?;
            self.inner.load_session(id).await
        })
    }

    fn load_sessions_on(&self, date: NaiveDate) -> StoreFuture<'_, Vec<GymSession>> {
        Box::pin(async move {
            self.check_reads()?;
            self.inner.load_sessions_on(date).await
        })
    }

    fn save_session(&self, session: GymSession) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            if Self::take_failure(&self.failing_session_saves) {
                return Err(StoreError::Backend(format!(
                    "injected failure saving session {}",
                    session.id
                )));
            }
            self.inner.save_session(session).await?;
            self.session_saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn load_reservation(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move {
            self.check_reads()?;
            self.inner.load_reservation(id).await
        })
    }

    fn load_reservations_by_session(&self, id: SessionId) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move {
            self.check_reads()?;
            self.inner.load_reservations_by_session(id).await
        })
    }

    fn load_reservations_by_user(&self, id: UserId) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move {
            self.check_reads()?;
            self.inner.load_reservations_by_user(id).await
        })
    }

    fn save_reservation(&self, reservation: Reservation) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            if Self::take_failure(&self.failing_reservation_saves) {
                return Err(StoreError::Backend(format!(
                    "injected failure saving reservation {}",
                    reservation.id
                )));
            }
            self.inner.save_reservation(reservation).await?;
            self.reservation_saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{SessionSpecBuilder, test_clock};
    use gym_core::environment::Clock;
    use gym_core::types::{Capacity, GymSession};

    /// Store that accepts writes and remembers nothing.
    struct NullStore;

    impl ReservationStore for NullStore {
        fn load_session(&self, _id: SessionId) -> StoreFuture<'_, Option<GymSession>> {
            Box::pin(async { Ok(None) })
        }
        fn load_sessions_on(&self, _date: NaiveDate) -> StoreFuture<'_, Vec<GymSession>> {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn save_session(&self, _session: GymSession) -> StoreFuture<'_, ()> {
            Box::pin(async { Ok(()) })
        }
        fn load_reservation(&self, _id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
            Box::pin(async { Ok(None) })
        }
        fn load_reservations_by_session(&self, _id: SessionId) -> StoreFuture<'_, Vec<Reservation>> {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn load_reservations_by_user(&self, _id: UserId) -> StoreFuture<'_, Vec<Reservation>> {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn save_reservation(&self, _reservation: Reservation) -> StoreFuture<'_, ()> {
            Box::pin(async { Ok(()) })
        }
    }

    fn session() -> GymSession {
        let spec = SessionSpecBuilder::new(test_clock().now().date_naive()).build();
        GymSession::new(spec, Capacity::new(5).unwrap(), test_clock().now())
    }

    #[tokio::test]
    async fn test_fails_exactly_the_scheduled_number_of_writes() {
        let store = FlakyStore::new(NullStore);
        store.fail_next_session_saves(2);

        assert!(store.save_session(session()).await.is_err());
        assert!(store.save_session(session()).await.is_err());
        assert!(store.save_session(session()).await.is_ok());
        assert_eq!(store.session_saves(), 1);
    }

    #[tokio::test]
    async fn test_reads_down_fails_loads_only() {
        let store = FlakyStore::new(NullStore);
        store.set_reads_down(true);

        assert!(matches!(
            store.load_session(SessionId::new()).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.save_session(session()).await.is_ok());

        store.set_reads_down(false);
        assert!(store.load_session(SessionId::new()).await.unwrap().is_none());
    }
}
