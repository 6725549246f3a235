//! Reservation Service facade.
//!
//! Single entry point per use case. The facade adds no business rules: it reads
//! the clock, admits the operation under the per-user, per-session and
//! per-equipment locks, runs the ledger or registry call, and hands back the
//! caller-facing error unchanged.
//!
//! # Lock protocol
//!
//! Locks are always taken in the order schedule date → user → session → equipment
//! (equipment keys ascending), each attempt under one shared deadline. Session
//! creation holds the date's schedule lock across its conflict check and insert. A timed-out attempt drops
//! everything it holds and is retried with backoff; when the retry budget runs out
//! the caller gets [`ReservationError::ConcurrencyTimeout`].
//!
//! Once the locks are held the operation runs on its own task, so a caller that
//! gives up mid-flight cannot leave a slot or equipment hold behind.

use chrono::NaiveDate;
use gym_core::ReservationError;
use gym_core::environment::{Clock, SystemClock};
use gym_core::notifier::Notifier;
use gym_core::store::ReservationStore;
use gym_core::types::{
    ActorContext, CreatedReservation, Equipment, EquipmentId, EquipmentStatus, GymSession,
    ReservationId, ReservationRequest, ReservationView, SessionAvailability, SessionId,
    SessionSpec, UserId,
};
use gym_runtime::metrics::ReservationMetrics;
use gym_runtime::{KeyGuard, KeyedLocks, LockError, RetryPolicy, retry_with_predicate};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::Config;
use crate::equipment::EquipmentAllocator;
use crate::ledger::{LedgerPolicy, ReservationLedger};
use crate::notifier::LoggingNotifier;
use crate::registry::SessionRegistry;

/// Errors raised while assembling a [`ReservationService`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceBuildError {
    /// No persistence collaborator was supplied
    #[error("A reservation store is required")]
    MissingStore,
}

/// Keys an operation must hold before it runs.
#[derive(Debug, Default)]
struct LockScope {
    date: Option<NaiveDate>,
    user: Option<UserId>,
    session: Option<SessionId>,
    equipment: Vec<EquipmentId>,
}

/// Guards for one admitted operation. Dropping it releases every lock.
#[derive(Debug)]
struct HeldLocks {
    _date: Option<KeyGuard<NaiveDate>>,
    _user: Option<KeyGuard<UserId>>,
    _session: Option<KeyGuard<SessionId>>,
    _equipment: Vec<KeyGuard<EquipmentId>>,
}

/// Concurrency-safe API over the reservation engine.
pub struct ReservationService {
    registry: Arc<SessionRegistry>,
    equipment: Arc<EquipmentAllocator>,
    ledger: Arc<ReservationLedger>,
    clock: Arc<dyn Clock>,
    schedule_locks: KeyedLocks<NaiveDate>,
    user_locks: KeyedLocks<UserId>,
    session_locks: KeyedLocks<SessionId>,
    equipment_locks: KeyedLocks<EquipmentId>,
    lock_timeout: Duration,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ReservationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationService")
            .field("lock_timeout", &self.lock_timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ReservationService {
    /// Start assembling a service
    #[must_use]
    pub fn builder() -> ReservationServiceBuilder {
        ReservationServiceBuilder::new()
    }

    // ── Sessions ────────────────────────────────────────────────────────────

    /// Create a session (trainer/admin use case).
    ///
    /// # Errors
    ///
    /// `InvalidCapacity`, `InvalidTime`, `InvalidDate`, `ScheduleConflict`, `Storage`,
    /// `ConcurrencyTimeout`.
    pub async fn create_session(
        &self,
        spec: SessionSpec,
        actor: &ActorContext,
    ) -> Result<GymSession, ReservationError> {
        let result = async {
            let held = self
                .lock(LockScope {
                    date: Some(spec.date),
                    ..LockScope::default()
                })
                .await?;
            let registry = Arc::clone(&self.registry);
            let now = self.clock.now();
            run_detached(held, async move { registry.create_session(spec, now).await }).await
        }
        .await;
        if let Err(error) = &result {
            tracing::debug!(actor = %actor.user_id, role = %actor.role, error = %error, "Session rejected");
        }
        result
    }

    /// Soft-close a session. Existing reservations stay valid.
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `Storage`, `ConcurrencyTimeout`.
    pub async fn close_session(
        &self,
        session_id: SessionId,
        actor: &ActorContext,
    ) -> Result<GymSession, ReservationError> {
        let held = self
            .lock(LockScope {
                session: Some(session_id),
                ..LockScope::default()
            })
            .await?;
        let registry = Arc::clone(&self.registry);
        let closed = run_detached(held, async move { registry.close_session(session_id).await }).await?;
        tracing::info!(session_id = %session_id, actor = %actor.user_id, role = %actor.role, "Session closed");
        Ok(closed)
    }

    /// Capacity, reserved and remaining spots for a session.
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `Storage`.
    pub async fn session_availability(
        &self,
        session_id: SessionId,
    ) -> Result<SessionAvailability, ReservationError> {
        self.registry.availability(session_id).await
    }

    /// Sessions scheduled on `date`, by start time.
    ///
    /// # Errors
    ///
    /// `Storage`.
    pub async fn sessions_on(&self, date: NaiveDate) -> Result<Vec<GymSession>, ReservationError> {
        self.registry.sessions_on(date).await
    }

    /// Recompute a session's reserved spots from its active reservations.
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `Storage`, `ConcurrencyTimeout`.
    pub async fn reconcile_session(&self, session_id: SessionId) -> Result<GymSession, ReservationError> {
        let held = self
            .lock(LockScope {
                session: Some(session_id),
                ..LockScope::default()
            })
            .await?;
        let registry = Arc::clone(&self.registry);
        run_detached(held, async move { registry.reconcile(session_id).await }).await
    }

    // ── Reservations ────────────────────────────────────────────────────────

    /// Reserve a spot (and optionally equipment) for the requesting user.
    ///
    /// # Errors
    ///
    /// Any create-path error of the ledger, or `ConcurrencyTimeout`.
    pub async fn create_reservation(
        &self,
        request: ReservationRequest,
        actor: &ActorContext,
    ) -> Result<CreatedReservation, ReservationError> {
        let ReservationRequest {
            user_id,
            session_id,
            equipment_ids,
        } = request;

        let result = async {
            let held = self
                .lock(LockScope {
                    date: None,
                    user: Some(user_id),
                    session: Some(session_id),
                    equipment: equipment_ids.clone(),
                })
                .await?;
            let ledger = Arc::clone(&self.ledger);
            let now = self.clock.now();
            run_detached(held, async move {
                ledger
                    .create_reservation(user_id, session_id, &equipment_ids, now)
                    .await
            })
            .await
        }
        .await;

        if let Err(error) = &result {
            ReservationMetrics::record_rejected(error.code());
            tracing::debug!(
                user_id = %user_id,
                session_id = %session_id,
                actor = %actor.user_id,
                role = %actor.role,
                error = %error,
                "Reservation rejected"
            );
        }
        result
    }

    /// Cancel a reservation on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// Any cancel-path error of the ledger, or `ConcurrencyTimeout`.
    pub async fn cancel_reservation(
        &self,
        reservation_id: ReservationId,
        reason: Option<String>,
        actor: &ActorContext,
    ) -> Result<ReservationView, ReservationError> {
        let current = self.ledger.get(reservation_id).await?;
        let held = self.lock(scope_of(&current)).await?;

        let ledger = Arc::clone(&self.ledger);
        let actor_id = actor.user_id;
        let now = self.clock.now();
        let result = run_detached(held, async move {
            ledger
                .cancel_reservation(reservation_id, reason, actor_id, now)
                .await
        })
        .await;

        if let Err(error) = &result {
            tracing::debug!(
                reservation_id = %reservation_id,
                actor = %actor.user_id,
                role = %actor.role,
                error = %error,
                "Cancellation rejected"
            );
        }
        result
    }

    /// Record whether the holder attended.
    ///
    /// # Errors
    ///
    /// Any attendance-path error of the ledger, or `ConcurrencyTimeout`.
    pub async fn mark_attendance(
        &self,
        reservation_id: ReservationId,
        attended: bool,
        actor: &ActorContext,
    ) -> Result<ReservationView, ReservationError> {
        let current = self.ledger.get(reservation_id).await?;
        let held = self.lock(scope_of(&current)).await?;

        let ledger = Arc::clone(&self.ledger);
        let actor_id = actor.user_id;
        let now = self.clock.now();
        let result = run_detached(held, async move {
            ledger
                .mark_attendance(reservation_id, attended, actor_id, now)
                .await
        })
        .await;

        if let Err(error) = &result {
            tracing::debug!(
                reservation_id = %reservation_id,
                actor = %actor.user_id,
                role = %actor.role,
                error = %error,
                "Attendance rejected"
            );
        }
        result
    }

    /// One reservation.
    ///
    /// # Errors
    ///
    /// `ReservationNotFound`, `Storage`.
    pub async fn get_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<ReservationView, ReservationError> {
        self.ledger.get(reservation_id).await
    }

    /// A user's reservations, any status.
    ///
    /// # Errors
    ///
    /// `Storage`.
    pub async fn reservations_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ReservationView>, ReservationError> {
        self.ledger.for_user(user_id).await
    }

    /// A session's reservations, any status.
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `Storage`.
    pub async fn reservations_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<ReservationView>, ReservationError> {
        self.ledger.for_session(session_id).await
    }

    // ── Equipment ───────────────────────────────────────────────────────────

    /// Add an item to the catalogue
    pub async fn register_equipment(&self, equipment: Equipment) -> EquipmentId {
        self.equipment.register(equipment).await
    }

    /// Change an item's status (maintenance workflow).
    ///
    /// Returns `None` for unknown ids.
    ///
    /// # Errors
    ///
    /// `ConcurrencyTimeout` if the item stays locked by reservations.
    pub async fn set_equipment_status(
        &self,
        equipment_id: EquipmentId,
        status: EquipmentStatus,
    ) -> Result<Option<Equipment>, ReservationError> {
        let _held = self
            .lock(LockScope {
                equipment: vec![equipment_id],
                ..LockScope::default()
            })
            .await?;
        Ok(self.equipment.set_status(equipment_id, status).await)
    }

    /// Equipment currently free to reserve
    pub async fn available_equipment(&self) -> Vec<Equipment> {
        self.equipment.available().await
    }

    // ── Locking ─────────────────────────────────────────────────────────────

    async fn lock(&self, scope: LockScope) -> Result<HeldLocks, ReservationError> {
        retry_with_predicate(&self.retry, || self.try_lock(&scope), |_: &LockError| true)
            .await
            .map_err(|failure| {
                tracing::warn!(
                    resource = failure.error.resource(),
                    attempts = failure.attempts,
                    "Lock contention exhausted retry budget"
                );
                ReservationError::ConcurrencyTimeout {
                    resource: failure.error.resource().to_string(),
                    attempts: failure.attempts,
                }
            })
    }

    async fn try_lock(&self, scope: &LockScope) -> Result<HeldLocks, LockError> {
        let deadline = Instant::now() + self.lock_timeout;

        let date = match scope.date {
            Some(date) => Some(self.schedule_locks.acquire_until(date, deadline).await?),
            None => None,
        };
        let user = match scope.user {
            Some(id) => Some(self.user_locks.acquire_until(id, deadline).await?),
            None => None,
        };
        let session = match scope.session {
            Some(id) => Some(self.session_locks.acquire_until(id, deadline).await?),
            None => None,
        };
        let equipment = self
            .equipment_locks
            .acquire_all_until(scope.equipment.iter().copied(), deadline)
            .await?;

        Ok(HeldLocks {
            _date: date,
            _user: user,
            _session: session,
            _equipment: equipment,
        })
    }
}

fn scope_of(reservation: &ReservationView) -> LockScope {
    LockScope {
        date: None,
        user: Some(reservation.user_id),
        session: Some(reservation.session_id),
        equipment: reservation.equipment_ids.clone(),
    }
}

/// Run `work` on its own task while `held` stays alive, then release the locks.
async fn run_detached<T, Fut>(held: HeldLocks, work: Fut) -> Result<T, ReservationError>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T, ReservationError>> + Send + 'static,
{
    tokio::spawn(async move {
        let result = work.await;
        drop(held);
        result
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Reservation task aborted");
        ReservationError::Internal(format!("reservation task aborted: {e}"))
    })?
}

/// Builder for [`ReservationService`].
///
/// Only the store is required. The clock defaults to [`SystemClock`], the notifier
/// to [`LoggingNotifier`] and the configuration to [`Config::default`].
#[derive(Default)]
pub struct ReservationServiceBuilder {
    store: Option<Arc<dyn ReservationStore>>,
    clock: Option<Arc<dyn Clock>>,
    notifier: Option<Arc<dyn Notifier>>,
    config: Option<Config>,
}

impl ReservationServiceBuilder {
    /// Empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Persistence collaborator
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ReservationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Time source
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Notification sink
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Policy and concurrency settings
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Wire everything together.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceBuildError::MissingStore`] if no store was supplied.
    pub fn build(self) -> Result<ReservationService, ServiceBuildError> {
        let store = self.store.ok_or(ServiceBuildError::MissingStore)?;
        let config = self.config.unwrap_or_default();
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LoggingNotifier));

        let registry = Arc::new(
            SessionRegistry::new(Arc::clone(&store))
                .with_lock_timeout(config.concurrency.lock_timeout()),
        );
        let equipment = Arc::new(EquipmentAllocator::new());
        let policy = LedgerPolicy {
            max_active_reservations: config.policy.max_active_reservations,
            cancellation_window: config.policy.cancellation_window(),
        };
        let ledger = Arc::new(ReservationLedger::new(
            Arc::clone(&registry),
            Arc::clone(&equipment),
            store,
            notifier,
            policy,
        ));

        tracing::debug!(
            max_active_reservations = policy.max_active_reservations,
            cancellation_window_minutes = policy.cancellation_window.num_minutes(),
            lock_timeout_ms = config.concurrency.lock_timeout_ms,
            max_retries = config.concurrency.max_retries,
            "Reservation service assembled"
        );

        Ok(ReservationService {
            registry,
            equipment,
            ledger,
            clock,
            schedule_locks: KeyedLocks::new("schedule"),
            user_locks: KeyedLocks::new("user"),
            session_locks: KeyedLocks::new("session"),
            equipment_locks: KeyedLocks::new("equipment"),
            lock_timeout: config.concurrency.lock_timeout(),
            retry: config.concurrency.retry_policy(),
        })
    }
}

impl std::fmt::Debug for ReservationServiceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationServiceBuilder")
            .field("store", &self.store.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::InMemoryReservationStore;
    use gym_core::types::Role;
    use gym_testing::{SessionSpecBuilder, test_clock};

    fn service() -> ReservationService {
        ReservationService::builder()
            .with_store(Arc::new(InMemoryReservationStore::new()))
            .with_clock(Arc::new(test_clock()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_store() {
        assert_eq!(
            ReservationService::builder().build().unwrap_err(),
            ServiceBuildError::MissingStore
        );
    }

    #[tokio::test]
    async fn test_locks_released_after_operation() {
        let service = service();
        let trainer = ActorContext::new(UserId::new(), Role::Trainer);
        let member = UserId::new();
        let session = service
            .create_session(SessionSpecBuilder::new(test_clock().now().date_naive()).build(), &trainer)
            .await
            .unwrap();

        service
            .create_reservation(
                ReservationRequest::new(member, session.id),
                &ActorContext::new(member, Role::Member),
            )
            .await
            .unwrap();

        // every key is free again
        let held = service
            .try_lock(&LockScope {
                date: Some(session.date),
                user: Some(member),
                session: Some(session.id),
                equipment: Vec::new(),
            })
            .await;
        assert!(held.is_ok());
    }

    #[tokio::test]
    async fn test_contended_lock_surfaces_concurrency_timeout() {
        let config = Config {
            concurrency: crate::config::ConcurrencyConfig {
                lock_timeout_ms: 10,
                max_retries: 1,
                retry_initial_delay_ms: 1,
                retry_max_delay_ms: 2,
            },
            ..Config::default()
        };
        let service = ReservationService::builder()
            .with_store(Arc::new(InMemoryReservationStore::new()))
            .with_clock(Arc::new(test_clock()))
            .with_config(config)
            .build()
            .unwrap();
        let session_id = SessionId::new();
        let _blocker = service
            .session_locks
            .acquire(session_id, Duration::from_secs(1))
            .await
            .unwrap();

        let member = UserId::new();
        let err = service
            .create_reservation(
                ReservationRequest::new(member, session_id),
                &ActorContext::new(member, Role::Member),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReservationError::ConcurrencyTimeout { ref resource, attempts: 2 } if resource == "session"
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_held_schedule_lock_times_out_session_creation() {
        let config = Config {
            concurrency: crate::config::ConcurrencyConfig {
                lock_timeout_ms: 10,
                max_retries: 2,
                retry_initial_delay_ms: 1,
                retry_max_delay_ms: 2,
            },
            ..Config::default()
        };
        let service = ReservationService::builder()
            .with_store(Arc::new(InMemoryReservationStore::new()))
            .with_clock(Arc::new(test_clock()))
            .with_config(config)
            .build()
            .unwrap();
        let trainer = ActorContext::new(UserId::new(), Role::Trainer);
        let date = test_clock().now().date_naive();
        let blocker = service
            .schedule_locks
            .acquire(date, Duration::from_secs(1))
            .await
            .unwrap();

        let err = service
            .create_session(SessionSpecBuilder::new(date).build(), &trainer)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReservationError::ConcurrencyTimeout { ref resource, attempts: 3 } if resource == "schedule"
        ));

        // other dates are not serialized behind it
        let tomorrow = date.succ_opt().unwrap();
        assert!(
            service
                .create_session(SessionSpecBuilder::new(tomorrow).build(), &trainer)
                .await
                .is_ok()
        );

        drop(blocker);
        assert!(
            service
                .create_session(SessionSpecBuilder::new(date).build(), &trainer)
                .await
                .is_ok()
        );
    }
}
