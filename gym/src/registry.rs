//! Session Registry.
//!
//! Holds session definitions and their reserved-spot counters. Each session lives
//! behind its own async mutex, so slot accounting is a compare-and-increment under
//! a per-session lock: two callers racing for the last slot get exactly one
//! success. Sessions are loaded from the persistence collaborator the first time
//! they are touched and written back through [`SessionRegistry::persist`].
//!
//! Waiting on a session's mutex is bounded by the registry's lock timeout. Creating
//! sessions does not serialize callers: the
//! [`ReservationService`](crate::ReservationService) holds a per-date schedule lock
//! around the conflict check and insert.

use chrono::{DateTime, NaiveDate, Utc};
use gym_core::ReservationError;
use gym_core::store::ReservationStore;
use gym_core::types::{GymSession, SessionAvailability, SessionId, SessionSpec};
use gym_core::validation::{validate_capacity, validate_session_window};
use gym_runtime::metrics::{LockMetrics, ReservationMetrics};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Default wait for a session's mutex
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Finished sessions are evicted from the cache once it holds this many entries.
const EVICT_THRESHOLD: usize = 256;

/// Proof that one slot of a session is held.
///
/// Carries the session as it was right after the increment.
#[derive(Debug, Clone)]
pub struct SlotToken {
    /// Session snapshot after the slot was taken
    pub session: GymSession,
}

impl SlotToken {
    /// Session the slot belongs to
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session.id
    }
}

/// Registry of gym sessions and their capacity counters.
pub struct SessionRegistry {
    store: Arc<dyn ReservationStore>,
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<GymSession>>>>,
    lock_timeout: Duration,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry").finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Create a registry backed by `store`
    #[must_use]
    pub fn new(store: Arc<dyn ReservationStore>) -> Self {
        Self {
            store,
            sessions: RwLock::new(HashMap::new()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Bound the wait for a session's mutex
    #[must_use]
    pub const fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Validate and persist a new session with no reserved spots.
    ///
    /// Callers creating sessions concurrently must serialize per date.
    ///
    /// # Errors
    ///
    /// - `InvalidCapacity`, `InvalidTime`, `InvalidDate` for malformed specs
    /// - `ScheduleConflict` if an open session on the same date overlaps and shares
    ///   the trainer or the location
    /// - `Storage` if the store fails
    /// - `ConcurrencyTimeout` if a same-day session stays locked
    pub async fn create_session(
        &self,
        spec: SessionSpec,
        now: DateTime<Utc>,
    ) -> Result<GymSession, ReservationError> {
        let capacity = validate_capacity(spec.capacity)?;
        validate_session_window(spec.date, spec.start_time, spec.end_time, now.date_naive())?;

        let same_day = self.sessions_on(spec.date).await?;
        if let Some((conflicting, resource)) = same_day
            .iter()
            .find_map(|s| s.conflict_with(&spec).map(|resource| (s.id, resource)))
        {
            tracing::debug!(
                conflicting = %conflicting,
                resource = %resource,
                date = %spec.date,
                "Session rejected: schedule conflict"
            );
            return Err(ReservationError::ScheduleConflict {
                conflicting,
                resource,
            });
        }

        let session = GymSession::new(spec, capacity, now);
        self.store.save_session(session.clone()).await?;
        let cached = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(session.id, Arc::new(Mutex::new(session.clone())));
            sessions.len()
        };
        if cached >= EVICT_THRESHOLD {
            self.evict_finished(now).await;
        }

        tracing::info!(
            session_id = %session.id,
            date = %session.date,
            start = %session.start_time,
            end = %session.end_time,
            capacity = session.capacity.value(),
            "Session created"
        );
        ReservationMetrics::record_reserved_spots(session.id.to_string(), 0);
        Ok(session)
    }

    /// Current session data.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` for unknown ids, `Storage` if hydration fails.
    pub async fn lookup(&self, id: SessionId) -> Result<GymSession, ReservationError> {
        let session = self.lock_session(id).await?;
        Ok(session.clone())
    }

    /// Take one slot if `reserved_spots < capacity`.
    ///
    /// # Errors
    ///
    /// - `CapacityExceeded` if the session is full (nothing changes)
    /// - `SessionClosed` if the session is soft-closed
    /// - `SessionNotFound` / `Storage` from the lookup
    pub async fn try_reserve_slot(&self, id: SessionId) -> Result<SlotToken, ReservationError> {
        let mut session = self.lock_session(id).await?;

        if session.closed {
            return Err(ReservationError::SessionClosed(id));
        }
        if session.is_full() {
            return Err(ReservationError::CapacityExceeded {
                session_id: id,
                capacity: session.capacity.value(),
            });
        }

        session.reserved_spots += 1;
        ReservationMetrics::record_reserved_spots(id.to_string(), session.reserved_spots);
        tracing::debug!(
            session_id = %id,
            reserved = session.reserved_spots,
            capacity = session.capacity.value(),
            "Slot reserved"
        );
        Ok(SlotToken {
            session: session.clone(),
        })
    }

    /// Give one slot back. The counter never goes below zero.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` / `Storage` from the lookup.
    pub async fn release_slot(&self, id: SessionId) -> Result<GymSession, ReservationError> {
        let mut session = self.lock_session(id).await?;

        if session.reserved_spots == 0 {
            tracing::warn!(session_id = %id, "Release on a session with no reserved spots");
        }
        session.reserved_spots = session.reserved_spots.saturating_sub(1);
        ReservationMetrics::record_reserved_spots(id.to_string(), session.reserved_spots);
        tracing::debug!(session_id = %id, reserved = session.reserved_spots, "Slot released");
        Ok(session.clone())
    }

    /// Write the session's current state to the store.
    ///
    /// The session lock is held for the write, so saves of one session reach the
    /// store in the order its counter changed.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the write fails.
    pub async fn persist(&self, id: SessionId) -> Result<(), ReservationError> {
        let session = self.lock_session(id).await?;
        self.store.save_session(session.clone()).await?;
        Ok(())
    }

    /// Soft-close a session: existing reservations stay, new ones are refused.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or `Storage`; on a failed write the session stays open.
    pub async fn close_session(&self, id: SessionId) -> Result<GymSession, ReservationError> {
        let mut session = self.lock_session(id).await?;
        if session.closed {
            return Ok(session.clone());
        }

        let mut closed = session.clone();
        closed.closed = true;
        self.store.save_session(closed.clone()).await?;
        *session = closed;

        tracing::info!(session_id = %id, reserved = session.reserved_spots, "Session closed");
        Ok(session.clone())
    }

    /// Every session on `date`, ordered by start time.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the store fails, `ConcurrencyTimeout` if a session stays locked.
    pub async fn sessions_on(&self, date: NaiveDate) -> Result<Vec<GymSession>, ReservationError> {
        let mut sessions = self.store.load_sessions_on(date).await?;
        let cached: Vec<Option<Arc<Mutex<GymSession>>>> = {
            let map = self.sessions.read().await;
            sessions.iter().map(|s| map.get(&s.id).cloned()).collect()
        };
        // Cached entries carry the live counters
        for (session, entry) in sessions.iter_mut().zip(cached) {
            if let Some(entry) = entry {
                *session = self.bounded_lock(session.id, entry).await?.clone();
            }
        }
        Ok(sessions)
    }

    /// Capacity snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or `Storage`.
    pub async fn availability(&self, id: SessionId) -> Result<SessionAvailability, ReservationError> {
        Ok(self.lookup(id).await?.availability())
    }

    /// Recompute `reserved_spots` from the reservations in the store that still hold
    /// a seat. Completed and missed reservations keep theirs.
    ///
    /// Repairs drift left behind by a counter write that failed after its
    /// reservation committed. The result is clamped to capacity.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or `Storage`.
    pub async fn reconcile(&self, id: SessionId) -> Result<GymSession, ReservationError> {
        let mut session = self.lock_session(id).await?;

        let reservations = self.store.load_reservations_by_session(id).await?;
        let seated = reservations.iter().filter(|r| r.holds_slot()).count();
        let seated = u32::try_from(seated).unwrap_or(u32::MAX);
        let capacity = session.capacity.value();
        if seated > capacity {
            tracing::error!(
                session_id = %id,
                seated,
                capacity,
                "More seated reservations than capacity"
            );
        }

        let repaired = seated.min(capacity);
        if repaired != session.reserved_spots {
            tracing::warn!(
                session_id = %id,
                recorded = session.reserved_spots,
                actual = repaired,
                "Reserved spot counter drifted, repairing"
            );
            let mut updated = session.clone();
            updated.reserved_spots = repaired;
            self.store.save_session(updated.clone()).await?;
            *session = updated;
            ReservationMetrics::record_reserved_spots(id.to_string(), repaired);
        }
        Ok(session.clone())
    }

    /// Drop cached sessions that ended before `now` and that nobody is using.
    ///
    /// Evicted sessions are hydrated again from the store if touched later.
    /// Returns how many entries were removed.
    pub async fn evict_finished(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| {
            Arc::strong_count(entry) > 1
                || entry.try_lock().map_or(true, |session| session.ends_at() > now)
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::debug!(evicted, cached = sessions.len(), "Finished sessions evicted");
        }
        evicted
    }

    async fn lock_session(
        &self,
        id: SessionId,
    ) -> Result<OwnedMutexGuard<GymSession>, ReservationError> {
        let entry = self.entry(id).await?;
        self.bounded_lock(id, entry).await
    }

    async fn bounded_lock(
        &self,
        id: SessionId,
        entry: Arc<Mutex<GymSession>>,
    ) -> Result<OwnedMutexGuard<GymSession>, ReservationError> {
        if let Ok(guard) = tokio::time::timeout(self.lock_timeout, entry.lock_owned()).await {
            Ok(guard)
        } else {
            LockMetrics::record_timeout("session");
            tracing::warn!(session_id = %id, "Timed out waiting for session state");
            Err(ReservationError::ConcurrencyTimeout {
                resource: "session".to_string(),
                attempts: 1,
            })
        }
    }

    async fn entry(&self, id: SessionId) -> Result<Arc<Mutex<GymSession>>, ReservationError> {
        if let Some(entry) = self.sessions.read().await.get(&id) {
            return Ok(Arc::clone(entry));
        }

        let loaded = self
            .store
            .load_session(id)
            .await?
            .ok_or(ReservationError::SessionNotFound(id))?;

        // Another caller may have hydrated the same session meanwhile; keep theirs.
        let mut sessions = self.sessions.write().await;
        let entry = sessions.entry(id).or_insert_with(|| {
            tracing::debug!(session_id = %id, "Session hydrated from store");
            Arc::new(Mutex::new(loaded))
        });
        Ok(Arc::clone(entry))
    }
}
