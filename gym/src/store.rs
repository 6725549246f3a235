//! In-memory persistence collaborator.
//!
//! Backs the demo binary and the test suites. Every write is visible to the next
//! read, which is the consistency the engine assumes of any store.

use chrono::NaiveDate;
use gym_core::store::{ReservationStore, StoreFuture};
use gym_core::types::{GymSession, Reservation, ReservationId, SessionId, UserId};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Map-backed [`ReservationStore`].
#[derive(Debug, Default)]
pub struct InMemoryReservationStore {
    sessions: RwLock<HashMap<SessionId, GymSession>>,
    reservations: RwLock<HashMap<ReservationId, Reservation>>,
}

impl InMemoryReservationStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored reservations, any status
    pub async fn reservation_count(&self) -> usize {
        self.reservations.read().await.len()
    }
}

impl ReservationStore for InMemoryReservationStore {
    fn load_session(&self, id: SessionId) -> StoreFuture<'_, Option<GymSession>> {
        Box::pin(async move { Ok(self.sessions.read().await.get(&id).cloned()) })
    }

    fn load_sessions_on(&self, date: NaiveDate) -> StoreFuture<'_, Vec<GymSession>> {
        Box::pin(async move {
            let mut sessions: Vec<GymSession> = self
                .sessions
                .read()
                .await
                .values()
                .filter(|s| s.date == date)
                .cloned()
                .collect();
            sessions.sort_by_key(|s| (s.start_time, s.id));
            Ok(sessions)
        })
    }

    fn save_session(&self, session: GymSession) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.sessions.write().await.insert(session.id, session);
            Ok(())
        })
    }

    fn load_reservation(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move { Ok(self.reservations.read().await.get(&id).cloned()) })
    }

    fn load_reservations_by_session(&self, id: SessionId) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move {
            let mut found: Vec<Reservation> = self
                .reservations
                .read()
                .await
                .values()
                .filter(|r| r.session_id == id)
                .cloned()
                .collect();
            found.sort_by_key(|r| (r.reservation_date, r.id));
            Ok(found)
        })
    }

    fn load_reservations_by_user(&self, id: UserId) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move {
            let mut found: Vec<Reservation> = self
                .reservations
                .read()
                .await
                .values()
                .filter(|r| r.user_id == id)
                .cloned()
                .collect();
            found.sort_by_key(|r| (r.reservation_date, r.id));
            Ok(found)
        })
    }

    fn save_reservation(&self, reservation: Reservation) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.reservations
                .write()
                .await
                .insert(reservation.id, reservation);
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use gym_core::environment::Clock;
    use gym_core::types::Capacity;
    use gym_testing::fixtures::hm;
    use gym_testing::{SessionSpecBuilder, test_clock};

    #[tokio::test]
    async fn test_sessions_on_filters_and_orders_by_start() {
        let store = InMemoryReservationStore::new();
        let now = test_clock().now();
        let today = now.date_naive();
        let tomorrow = today.succ_opt().unwrap();

        let late = SessionSpecBuilder::new(today).window(hm(18, 0), hm(19, 0)).build();
        let early = SessionSpecBuilder::new(today).window(hm(7, 0), hm(8, 0)).build();
        let other_day = SessionSpecBuilder::new(tomorrow).build();
        for spec in [late, early, other_day] {
            store
                .save_session(GymSession::new(spec, Capacity::new(4).unwrap(), now))
                .await
                .unwrap();
        }

        let on_today = store.load_sessions_on(today).await.unwrap();
        let starts: Vec<_> = on_today.iter().map(|s| s.start_time).collect();
        assert_eq!(starts, vec![hm(7, 0), hm(18, 0)]);
    }

    #[tokio::test]
    async fn test_reservation_save_replaces_previous_version() {
        let store = InMemoryReservationStore::new();
        let now = test_clock().now();
        let user = UserId::new();
        let mut reservation =
            Reservation::new(ReservationId::new(), user, SessionId::new(), Vec::new(), now);
        store.save_reservation(reservation.clone()).await.unwrap();

        reservation.confirm().unwrap();
        store.save_reservation(reservation.clone()).await.unwrap();

        let by_user = store.load_reservations_by_user(user).await.unwrap();
        assert_eq!(by_user, vec![reservation]);
        assert_eq!(store.reservation_count().await, 1);
    }
}
