//! Reservation Ledger.
//!
//! Owns reservations and every status change they go through. Each operation
//! checks its preconditions, takes the resource holds it needs (session slot,
//! equipment), commits the reservation to the store, and undoes the holds if any
//! later step fails. Nothing here serializes concurrent callers: the
//! [`ReservationService`](crate::ReservationService) holds per-user, per-session
//! and per-equipment locks around each call.
//!
//! # Create sequence
//!
//! ```text
//! lookup session ─► closed? ─► duplicate? ─► user limit? ─► lead time
//!        │
//!        ▼
//! try_reserve_slot ──(full)──► CapacityExceeded
//!        │
//!        ▼
//! try_allocate ──(none)──► release slot ─► NoEquipmentAvailable
//!        │
//!        ▼
//! persist session ─► save reservation ──(fail)──► release slot + equipment ─► Storage
//!        │
//!        ▼
//! notify (spawned)
//! ```

use chrono::{DateTime, Duration, Utc};
use gym_core::ReservationError;
use gym_core::notifier::{Notification, NotificationKind, Notifier};
use gym_core::status::ReservationStatus;
use gym_core::store::ReservationStore;
use gym_core::types::{
    CreatedReservation, EquipmentAllocation, EquipmentId, Reservation, ReservationId,
    ReservationView, SessionId, UserId,
};
use gym_core::validation::{
    default_cancellation_window, validate_cancellation_window, validate_reservation_lead_time,
};
use gym_runtime::metrics::ReservationMetrics;
use std::sync::Arc;

use crate::equipment::EquipmentAllocator;
use crate::registry::SessionRegistry;

/// Policy constants enforced by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerPolicy {
    /// Maximum PENDING/CONFIRMED reservations per user
    pub max_active_reservations: u32,
    /// Minimum notice for a cancellation
    pub cancellation_window: Duration,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            max_active_reservations: 3,
            cancellation_window: default_cancellation_window(),
        }
    }
}

/// The reservation state machine and its invariants.
pub struct ReservationLedger {
    registry: Arc<SessionRegistry>,
    equipment: Arc<EquipmentAllocator>,
    store: Arc<dyn ReservationStore>,
    notifier: Arc<dyn Notifier>,
    policy: LedgerPolicy,
}

impl std::fmt::Debug for ReservationLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationLedger")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ReservationLedger {
    /// Wire a ledger to its collaborators
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        equipment: Arc<EquipmentAllocator>,
        store: Arc<dyn ReservationStore>,
        notifier: Arc<dyn Notifier>,
        policy: LedgerPolicy,
    ) -> Self {
        Self {
            registry,
            equipment,
            store,
            notifier,
            policy,
        }
    }

    /// Policy in force
    #[must_use]
    pub const fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    /// Create a confirmed reservation for `user_id` on `session_id`.
    ///
    /// Requested equipment is bound best-effort; ids that could not be bound are
    /// returned in [`CreatedReservation::unavailable_equipment`].
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `SessionClosed`, `DuplicateReservation`,
    /// `ReservationLimitExceeded`, `PastDate`, `CapacityExceeded`,
    /// `NoEquipmentAvailable`, `Storage`. On any error no reservation is stored and
    /// every slot or equipment hold taken by this call has been released.
    pub async fn create_reservation(
        &self,
        user_id: UserId,
        session_id: SessionId,
        equipment_ids: &[EquipmentId],
        now: DateTime<Utc>,
    ) -> Result<CreatedReservation, ReservationError> {
        let session = self.registry.lookup(session_id).await?;
        if session.closed {
            return Err(ReservationError::SessionClosed(session_id));
        }

        let held = self.store.load_reservations_by_user(user_id).await?;
        if let Some(existing) = held
            .iter()
            .find(|r| r.is_active() && r.session_id == session_id)
        {
            return Err(ReservationError::DuplicateReservation {
                user_id,
                session_id,
                existing: existing.id,
            });
        }

        let active = held.iter().filter(|r| r.is_active()).count();
        let active = u32::try_from(active).unwrap_or(u32::MAX);
        if active >= self.policy.max_active_reservations {
            return Err(ReservationError::ReservationLimitExceeded {
                user_id,
                limit: self.policy.max_active_reservations,
                active,
            });
        }

        validate_reservation_lead_time(session.date, session.start_time, now)?;

        let token = self.registry.try_reserve_slot(session_id).await?;

        let allocation = if equipment_ids.is_empty() {
            EquipmentAllocation::empty()
        } else {
            match self
                .equipment
                .try_allocate(equipment_ids, token.session.duration())
                .await
            {
                Ok(allocation) => allocation,
                Err(error) => {
                    self.roll_back(session_id, &[], "equipment unavailable").await;
                    return Err(error);
                }
            }
        };

        let mut reservation = Reservation::new(
            ReservationId::new(),
            user_id,
            session_id,
            allocation.allocated.clone(),
            now,
        );
        reservation
            .confirm()
            .map_err(|e| ReservationError::Internal(e.to_string()))?;

        if let Err(error) = self.registry.persist(session_id).await {
            self.roll_back(session_id, &allocation.allocated, "session write failed")
                .await;
            return Err(error);
        }

        if let Err(error) = self.store.save_reservation(reservation.clone()).await {
            self.roll_back(session_id, &allocation.allocated, "reservation write failed")
                .await;
            if let Err(persist_error) = self.registry.persist(session_id).await {
                tracing::error!(
                    session_id = %session_id,
                    error = %persist_error,
                    "Could not write back released slot; reconcile the session"
                );
            }
            return Err(error.into());
        }

        tracing::info!(
            reservation_id = %reservation.id,
            user_id = %user_id,
            session_id = %token.session_id(),
            reserved = token.session.reserved_spots,
            capacity = token.session.capacity.value(),
            equipment = reservation.equipment_ids.len(),
            "Reservation confirmed"
        );
        ReservationMetrics::record_created();
        self.dispatch(Notification::new(
            user_id,
            NotificationKind::ReservationConfirmed,
            reservation.id,
            now,
        ));

        Ok(CreatedReservation {
            reservation: ReservationView::from(&reservation),
            unavailable_equipment: allocation.unavailable,
        })
    }

    /// Cancel a reservation, returning its slot and equipment.
    ///
    /// `reason` defaults to `"Cancelled by user"`.
    ///
    /// # Errors
    ///
    /// `ReservationNotFound`, `AlreadyCancelled`, `InvalidState` (completed or
    /// missed), `PastReservation` once the session has started, `LateCancellation`
    /// inside the cancellation window, `SessionNotFound`, `Storage`.
    pub async fn cancel_reservation(
        &self,
        reservation_id: ReservationId,
        reason: Option<String>,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<ReservationView, ReservationError> {
        let mut reservation = self.load(reservation_id).await?;
        match reservation.status {
            ReservationStatus::Cancelled => {
                return Err(ReservationError::AlreadyCancelled(reservation_id));
            }
            ReservationStatus::Completed | ReservationStatus::Missed => {
                return Err(invalid_state(&reservation, "cancel"));
            }
            ReservationStatus::Pending | ReservationStatus::Confirmed => {}
        }

        let session = self.registry.lookup(reservation.session_id).await?;
        let starts_at = session.starts_at();
        if starts_at <= now {
            return Err(ReservationError::PastReservation {
                reservation_id,
                starts_at,
            });
        }
        validate_cancellation_window(starts_at, now, self.policy.cancellation_window)?;

        reservation
            .cancel(reason, actor, now)
            .map_err(|_| invalid_state(&reservation, "cancel"))?;
        self.store.save_reservation(reservation.clone()).await?;

        // Committed. Failures below leave a counter or item to repair, not a lost cancel.
        match self.registry.release_slot(session.id).await {
            Ok(_) => {
                if let Err(error) = self.registry.persist(session.id).await {
                    tracing::error!(
                        session_id = %session.id,
                        error = %error,
                        "Cancellation committed but slot release was not written"
                    );
                }
            }
            Err(error) => {
                tracing::error!(session_id = %session.id, error = %error, "Slot release failed");
            }
        }
        self.equipment.release(&reservation.equipment_ids).await;

        tracing::info!(
            reservation_id = %reservation_id,
            session_id = %session.id,
            actor = %actor,
            reason = reservation.cancellation_reason.as_deref().unwrap_or_default(),
            "Reservation cancelled"
        );
        ReservationMetrics::record_cancelled();
        self.dispatch(Notification::new(
            reservation.user_id,
            NotificationKind::ReservationCancelled,
            reservation_id,
            now,
        ));

        Ok(ReservationView::from(&reservation))
    }

    /// Record attendance: COMPLETED when `attended`, MISSED otherwise.
    ///
    /// Bound equipment goes back to AVAILABLE; the session slot stays taken.
    ///
    /// # Errors
    ///
    /// `ReservationNotFound`; `InvalidState` unless the reservation is CONFIRMED, or
    /// when marking MISSED before the session has started; `SessionNotFound`;
    /// `Storage`.
    pub async fn mark_attendance(
        &self,
        reservation_id: ReservationId,
        attended: bool,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<ReservationView, ReservationError> {
        let mut reservation = self.load(reservation_id).await?;
        if reservation.status != ReservationStatus::Confirmed {
            return Err(invalid_state(&reservation, "mark attendance for"));
        }

        if !attended {
            let session = self.registry.lookup(reservation.session_id).await?;
            if session.starts_at() > now {
                return Err(invalid_state(&reservation, "mark as missed before start"));
            }
        }

        reservation
            .record_attendance(attended, actor, now)
            .map_err(|_| invalid_state(&reservation, "mark attendance for"))?;
        self.store.save_reservation(reservation.clone()).await?;
        self.equipment.release(&reservation.equipment_ids).await;

        let kind = if attended {
            NotificationKind::AttendanceRecorded
        } else {
            NotificationKind::MarkedMissed
        };
        tracing::info!(
            reservation_id = %reservation_id,
            actor = %actor,
            status = %reservation.status,
            "Attendance recorded"
        );
        ReservationMetrics::record_attendance(attended);
        self.dispatch(Notification::new(
            reservation.user_id,
            kind,
            reservation_id,
            now,
        ));

        Ok(ReservationView::from(&reservation))
    }

    /// One reservation.
    ///
    /// # Errors
    ///
    /// `ReservationNotFound` or `Storage`.
    pub async fn get(&self, reservation_id: ReservationId) -> Result<ReservationView, ReservationError> {
        Ok(ReservationView::from(&self.load(reservation_id).await?))
    }

    /// Every reservation a user holds, any status, oldest first.
    ///
    /// # Errors
    ///
    /// `Storage`.
    pub async fn for_user(&self, user_id: UserId) -> Result<Vec<ReservationView>, ReservationError> {
        let reservations = self.store.load_reservations_by_user(user_id).await?;
        Ok(reservations.iter().map(ReservationView::from).collect())
    }

    /// Every reservation on a session, any status, oldest first.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` or `Storage`.
    pub async fn for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<ReservationView>, ReservationError> {
        self.registry.lookup(session_id).await?;
        let reservations = self.store.load_reservations_by_session(session_id).await?;
        Ok(reservations.iter().map(ReservationView::from).collect())
    }

    async fn load(&self, reservation_id: ReservationId) -> Result<Reservation, ReservationError> {
        self.store
            .load_reservation(reservation_id)
            .await?
            .ok_or(ReservationError::ReservationNotFound(reservation_id))
    }

    async fn roll_back(&self, session_id: SessionId, equipment: &[EquipmentId], cause: &'static str) {
        if let Err(error) = self.registry.release_slot(session_id).await {
            tracing::error!(session_id = %session_id, error = %error, "Rollback could not release slot");
        }
        self.equipment.release(equipment).await;
        tracing::warn!(session_id = %session_id, cause, "Reservation rolled back");
    }

    fn dispatch(&self, notification: Notification) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            let kind = notification.kind;
            let reservation_id = notification.related_entity_id;
            if let Err(error) = notifier.notify(notification).await {
                tracing::warn!(
                    reservation_id = %reservation_id,
                    kind = %kind,
                    error = %error,
                    "Notification dropped"
                );
            }
        });
    }
}

fn invalid_state(reservation: &Reservation, operation: &'static str) -> ReservationError {
    ReservationError::InvalidState {
        reservation_id: reservation.id,
        status: reservation.status,
        operation,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::InMemoryReservationStore;
    use gym_core::environment::Clock;
    use gym_core::types::{Equipment, EquipmentStatus, GymSession};
    use gym_testing::fixtures::hm;
    use gym_testing::{FailingNotifier, FlakyStore, RecordingNotifier, SessionSpecBuilder, test_clock};

    struct Harness {
        ledger: ReservationLedger,
        registry: Arc<SessionRegistry>,
        equipment: Arc<EquipmentAllocator>,
        store: Arc<FlakyStore<InMemoryReservationStore>>,
        notifier: Arc<RecordingNotifier>,
        now: DateTime<Utc>,
    }

    fn harness() -> Harness {
        let store = Arc::new(FlakyStore::new(InMemoryReservationStore::new()));
        let registry = Arc::new(SessionRegistry::new(store.clone()));
        let equipment = Arc::new(EquipmentAllocator::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let ledger = ReservationLedger::new(
            Arc::clone(&registry),
            Arc::clone(&equipment),
            store.clone(),
            notifier.clone(),
            LedgerPolicy::default(),
        );
        Harness {
            ledger,
            registry,
            equipment,
            store,
            notifier,
            now: test_clock().now(),
        }
    }

    impl Harness {
        /// Session on the clock's date starting `hours_ahead` hours from now
        async fn session_in(&self, hours_ahead: u32, capacity: i64) -> GymSession {
            let start = 8 + hours_ahead;
            let spec = SessionSpecBuilder::new(self.now.date_naive())
                .window(hm(start, 0), hm(start + 1, 0))
                .capacity(capacity)
                .build();
            self.registry.create_session(spec, self.now).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_create_confirms_and_takes_slot() {
        let h = harness();
        let session = h.session_in(4, 2).await;
        let user = UserId::new();

        let created = h
            .ledger
            .create_reservation(user, session.id, &[], h.now)
            .await
            .unwrap();
        assert_eq!(created.reservation.status, ReservationStatus::Confirmed);
        assert_eq!(created.reservation.user_id, user);
        assert!(created.unavailable_equipment.is_empty());
        assert_eq!(h.registry.lookup(session.id).await.unwrap().reserved_spots, 1);

        let notified = h.notifier.wait_for(1, std::time::Duration::from_secs(1)).await;
        assert_eq!(notified[0].kind, NotificationKind::ReservationConfirmed);
        assert_eq!(notified[0].related_entity_id, created.reservation.id);
    }

    #[tokio::test]
    async fn test_duplicate_and_limit_checks() {
        let h = harness();
        let user = UserId::new();
        let sessions = [
            h.session_in(3, 5).await,
            h.session_in(5, 5).await,
            h.session_in(7, 5).await,
            h.session_in(9, 5).await,
        ];

        h.ledger
            .create_reservation(user, sessions[0].id, &[], h.now)
            .await
            .unwrap();
        assert!(matches!(
            h.ledger.create_reservation(user, sessions[0].id, &[], h.now).await,
            Err(ReservationError::DuplicateReservation { .. })
        ));

        h.ledger
            .create_reservation(user, sessions[1].id, &[], h.now)
            .await
            .unwrap();
        h.ledger
            .create_reservation(user, sessions[2].id, &[], h.now)
            .await
            .unwrap();
        assert!(matches!(
            h.ledger.create_reservation(user, sessions[3].id, &[], h.now).await,
            Err(ReservationError::ReservationLimitExceeded { limit: 3, active: 3, .. })
        ));
        assert_eq!(h.registry.lookup(sessions[3].id).await.unwrap().reserved_spots, 0);
    }

    #[tokio::test]
    async fn test_past_session_rejected_without_taking_slot() {
        let h = harness();
        let session = h.session_in(1, 3).await;
        let later = h.now + Duration::hours(1);

        assert!(matches!(
            h.ledger.create_reservation(UserId::new(), session.id, &[], later).await,
            Err(ReservationError::PastDate { .. })
        ));
        assert_eq!(h.registry.lookup(session.id).await.unwrap().reserved_spots, 0);
    }

    #[tokio::test]
    async fn test_no_equipment_rolls_back_slot() {
        let h = harness();
        let session = h.session_in(4, 1).await;
        let broken = h
            .equipment
            .register(Equipment::new("Bike"))
            .await;
        h.equipment.set_status(broken, EquipmentStatus::Maintenance).await;

        assert!(matches!(
            h.ledger.create_reservation(UserId::new(), session.id, &[broken], h.now).await,
            Err(ReservationError::NoEquipmentAvailable { .. })
        ));
        assert_eq!(h.registry.lookup(session.id).await.unwrap().reserved_spots, 0);
        assert_eq!(h.store.inner().reservation_count().await, 0);
    }

    #[tokio::test]
    async fn test_reservation_write_failure_releases_everything() {
        let h = harness();
        let session = h.session_in(4, 1).await;
        let mat = h.equipment.register(Equipment::new("Mat")).await;
        h.store.fail_next_reservation_saves(1);

        let err = h
            .ledger
            .create_reservation(UserId::new(), session.id, &[mat], h.now)
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::Storage(_)));
        assert_eq!(h.registry.lookup(session.id).await.unwrap().reserved_spots, 0);
        assert_eq!(
            h.store.inner().load_session(session.id).await.unwrap().unwrap().reserved_spots,
            0
        );
        assert_eq!(h.equipment.get(mat).await.unwrap().status, EquipmentStatus::Available);
        assert_eq!(h.store.inner().reservation_count().await, 0);
    }

    #[tokio::test]
    async fn test_session_write_failure_releases_slot() {
        let h = harness();
        let session = h.session_in(4, 1).await;
        h.store.fail_next_session_saves(1);

        assert!(matches!(
            h.ledger.create_reservation(UserId::new(), session.id, &[], h.now).await,
            Err(ReservationError::Storage(_))
        ));
        assert_eq!(h.registry.lookup(session.id).await.unwrap().reserved_spots, 0);
        assert_eq!(h.store.inner().reservation_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_paths() {
        let h = harness();
        let session = h.session_in(3, 2).await;
        let user = UserId::new();
        let created = h
            .ledger
            .create_reservation(user, session.id, &[], h.now)
            .await
            .unwrap();
        let id = created.reservation.id;

        let inside_window = h.now + Duration::hours(1) + Duration::minutes(1);
        assert!(matches!(
            h.ledger.cancel_reservation(id, None, user, inside_window).await,
            Err(ReservationError::LateCancellation { .. })
        ));
        let after_start = h.now + Duration::hours(3);
        assert!(matches!(
            h.ledger.cancel_reservation(id, None, user, after_start).await,
            Err(ReservationError::PastReservation { .. })
        ));

        let view = h.ledger.cancel_reservation(id, None, user, h.now).await.unwrap();
        assert_eq!(view.status, ReservationStatus::Cancelled);
        assert_eq!(view.cancellation_reason.as_deref(), Some("Cancelled by user"));
        assert_eq!(view.cancelled_by_id, Some(user));
        assert_eq!(view.canceled_at, Some(h.now));
        assert_eq!(h.registry.lookup(session.id).await.unwrap().reserved_spots, 0);

        assert!(matches!(
            h.ledger.cancel_reservation(id, None, user, h.now).await,
            Err(ReservationError::AlreadyCancelled(found)) if found == id
        ));
        assert!(matches!(
            h.ledger.cancel_reservation(ReservationId::new(), None, user, h.now).await,
            Err(ReservationError::ReservationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_attendance_rules() {
        let h = harness();
        let session = h.session_in(3, 3).await;
        let trainer = session.trainer_id;
        let mat = h.equipment.register(Equipment::new("Mat")).await;

        let first = h
            .ledger
            .create_reservation(UserId::new(), session.id, &[mat], h.now)
            .await
            .unwrap();
        let second = h
            .ledger
            .create_reservation(UserId::new(), session.id, &[], h.now)
            .await
            .unwrap();

        // missed cannot be recorded before the session starts
        assert!(matches!(
            h.ledger.mark_attendance(second.reservation.id, false, trainer, h.now).await,
            Err(ReservationError::InvalidState { .. })
        ));

        let completed = h
            .ledger
            .mark_attendance(first.reservation.id, true, trainer, h.now)
            .await
            .unwrap();
        assert_eq!(completed.status, ReservationStatus::Completed);
        assert_eq!(completed.attended, Some(true));
        assert_eq!(completed.completed_by_id, Some(trainer));
        assert_eq!(h.equipment.get(mat).await.unwrap().status, EquipmentStatus::Available);
        // the seat was used, not freed
        assert_eq!(h.registry.lookup(session.id).await.unwrap().reserved_spots, 2);

        let after_start = h.now + Duration::hours(4);
        let missed = h
            .ledger
            .mark_attendance(second.reservation.id, false, trainer, after_start)
            .await
            .unwrap();
        assert_eq!(missed.status, ReservationStatus::Missed);

        assert!(matches!(
            h.ledger.mark_attendance(first.reservation.id, true, trainer, after_start).await,
            Err(ReservationError::InvalidState { status: ReservationStatus::Completed, .. })
        ));
        assert!(matches!(
            h.ledger.cancel_reservation(missed.id, None, trainer, h.now).await,
            Err(ReservationError::InvalidState { status: ReservationStatus::Missed, .. })
        ));
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_fail_operation() {
        let store = Arc::new(InMemoryReservationStore::new());
        let registry = Arc::new(SessionRegistry::new(store.clone()));
        let ledger = ReservationLedger::new(
            Arc::clone(&registry),
            Arc::new(EquipmentAllocator::new()),
            store,
            Arc::new(FailingNotifier),
            LedgerPolicy::default(),
        );
        let now = test_clock().now();
        let session = registry
            .create_session(SessionSpecBuilder::new(now.date_naive()).build(), now)
            .await
            .unwrap();

        assert!(ledger.create_reservation(UserId::new(), session.id, &[], now).await.is_ok());
    }

    #[tokio::test]
    async fn test_queries() {
        let h = harness();
        let session = h.session_in(4, 4).await;
        let user = UserId::new();
        let created = h
            .ledger
            .create_reservation(user, session.id, &[], h.now)
            .await
            .unwrap();

        assert_eq!(h.ledger.get(created.reservation.id).await.unwrap(), created.reservation);
        assert_eq!(h.ledger.for_user(user).await.unwrap().len(), 1);
        assert_eq!(h.ledger.for_session(session.id).await.unwrap().len(), 1);
        assert!(matches!(
            h.ledger.for_session(SessionId::new()).await,
            Err(ReservationError::SessionNotFound(_))
        ));
    }
}
