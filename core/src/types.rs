//! Domain types for the gym reservation engine.
//!
//! This module contains all value objects, entities and caller-facing record shapes:
//! sessions, reservations, equipment, and the actor context supplied by the API layer.

use crate::status::{InvalidTransition, ReservationStatus};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a gym session
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a new random `SessionId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `SessionId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a reservation
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReservationId(Uuid);

impl ReservationId {
    /// Creates a new random `ReservationId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ReservationId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a piece of equipment
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EquipmentId(Uuid);

impl EquipmentId {
    /// Creates a new random `EquipmentId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EquipmentId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for EquipmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EquipmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an authenticated user (member, trainer or admin).
///
/// Users are owned by the authentication layer; the engine only ever receives
/// their ids from callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `UserId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Value Objects
// ============================================================================

/// Session capacity (validated, always greater than zero)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Capacity(u32);

impl Capacity {
    /// Creates a `Capacity`, returning `None` for zero.
    #[must_use]
    pub const fn new(value: u32) -> Option<Self> {
        if value == 0 { None } else { Some(Self(value)) }
    }

    /// Returns the capacity value
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller role, supplied by the authentication layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Gym member making reservations for themselves
    Member,
    /// Trainer running sessions and marking attendance
    Trainer,
    /// Administrator
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Member => write!(f, "member"),
            Self::Trainer => write!(f, "trainer"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Already-authenticated caller identity.
///
/// The engine records the actor on audit fields and in logs; it never makes
/// authorization decisions from it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    /// Acting user
    pub user_id: UserId,
    /// Role granted upstream
    pub role: Role,
    /// Institutional identifier (student/staff number), if any
    pub institutional_id: Option<String>,
}

impl ActorContext {
    /// Creates an actor context without an institutional id
    #[must_use]
    pub const fn new(user_id: UserId, role: Role) -> Self {
        Self {
            user_id,
            role,
            institutional_id: None,
        }
    }

    /// Attaches an institutional id
    #[must_use]
    pub fn with_institutional_id(mut self, institutional_id: impl Into<String>) -> Self {
        self.institutional_id = Some(institutional_id.into());
        self
    }
}

/// Builds the UTC instant for a calendar date and wall-clock time.
#[must_use]
pub fn session_instant(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    date.and_time(time).and_utc()
}

// ============================================================================
// Sessions
// ============================================================================

/// Caller-supplied definition of a new session (not yet validated).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSpec {
    /// Calendar date of the session
    pub date: NaiveDate,
    /// Start time (inclusive)
    pub start_time: NaiveTime,
    /// End time (exclusive)
    pub end_time: NaiveTime,
    /// Requested capacity, validated to be positive
    pub capacity: i64,
    /// Trainer leading the session
    pub trainer_id: UserId,
    /// Room or area
    pub location: String,
    /// Free-form kind of session ("YOGA", "SPINNING", ...)
    pub session_type: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
}

/// Which shared resource two overlapping sessions collide on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictResource {
    /// Same trainer booked twice
    Trainer,
    /// Same location booked twice
    Location,
}

impl fmt::Display for ConflictResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trainer => write!(f, "trainer"),
            Self::Location => write!(f, "location"),
        }
    }
}

/// A scheduled, capacity-bounded gym session.
///
/// `reserved_spots` is only mutated by the session registry on behalf of the
/// reservation ledger; `0 <= reserved_spots <= capacity` always holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GymSession {
    /// Unique session identifier
    pub id: SessionId,
    /// Calendar date
    pub date: NaiveDate,
    /// Start time (inclusive)
    pub start_time: NaiveTime,
    /// End time (exclusive)
    pub end_time: NaiveTime,
    /// Maximum number of active reservations
    pub capacity: Capacity,
    /// Currently held slots
    pub reserved_spots: u32,
    /// Trainer leading the session
    pub trainer_id: UserId,
    /// Room or area
    pub location: String,
    /// Kind of session
    pub session_type: String,
    /// Optional description
    pub description: Option<String>,
    /// Soft-closed sessions accept no new reservations
    pub closed: bool,
    /// When the session was created
    pub created_at: DateTime<Utc>,
}

impl GymSession {
    /// Creates a new open session with no reserved spots.
    #[must_use]
    pub fn new(spec: SessionSpec, capacity: Capacity, created_at: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            date: spec.date,
            start_time: spec.start_time,
            end_time: spec.end_time,
            capacity,
            reserved_spots: 0,
            trainer_id: spec.trainer_id,
            location: spec.location,
            session_type: spec.session_type,
            description: spec.description,
            closed: false,
            created_at,
        }
    }

    /// Instant the session starts
    #[must_use]
    pub fn starts_at(&self) -> DateTime<Utc> {
        session_instant(self.date, self.start_time)
    }

    /// Instant the session ends
    #[must_use]
    pub fn ends_at(&self) -> DateTime<Utc> {
        session_instant(self.date, self.end_time)
    }

    /// Session length
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    /// Slots still free
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.capacity.value().saturating_sub(self.reserved_spots)
    }

    /// Checks if every slot is taken
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.reserved_spots >= self.capacity.value()
    }

    /// Half-open interval overlap on the same date; touching sessions do not overlap.
    #[must_use]
    pub fn overlaps(&self, date: NaiveDate, start: NaiveTime, end: NaiveTime) -> bool {
        self.date == date && self.start_time < end && start < self.end_time
    }

    /// Returns the shared resource a proposed session would collide on, if any.
    ///
    /// Closed sessions never conflict.
    #[must_use]
    pub fn conflict_with(&self, spec: &SessionSpec) -> Option<ConflictResource> {
        if self.closed || !self.overlaps(spec.date, spec.start_time, spec.end_time) {
            return None;
        }
        if self.trainer_id == spec.trainer_id {
            Some(ConflictResource::Trainer)
        } else if self.location.eq_ignore_ascii_case(&spec.location) {
            Some(ConflictResource::Location)
        } else {
            None
        }
    }

    /// Availability snapshot for callers
    #[must_use]
    pub fn availability(&self) -> SessionAvailability {
        SessionAvailability {
            session_id: self.id,
            capacity: self.capacity.value(),
            reserved: self.reserved_spots,
            remaining: self.remaining(),
            closed: self.closed,
        }
    }
}

/// Capacity snapshot of one session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAvailability {
    /// Session identifier
    pub session_id: SessionId,
    /// Total capacity
    pub capacity: u32,
    /// Currently reserved slots
    pub reserved: u32,
    /// Free slots (capacity - reserved)
    pub remaining: u32,
    /// Whether the session is soft-closed
    pub closed: bool,
}

// ============================================================================
// Equipment
// ============================================================================

/// Equipment status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EquipmentStatus {
    /// Free to be bound to a reservation
    Available,
    /// Bound to a reservation
    Reserved,
    /// Out of service
    Maintenance,
}

/// A reservable (or not) piece of gym equipment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    /// Unique equipment identifier
    pub id: EquipmentId,
    /// Display name
    pub name: String,
    /// Current status
    pub status: EquipmentStatus,
    /// Whether members may reserve this item at all
    pub reservable: bool,
    /// Longest session this item may be held for, in hours
    pub max_reservation_hours: Option<u32>,
}

impl Equipment {
    /// Creates a reservable, available item with no hold limit
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EquipmentId::new(),
            name: name.into(),
            status: EquipmentStatus::Available,
            reservable: true,
            max_reservation_hours: None,
        }
    }

    /// Sets the maximum hold length
    #[must_use]
    pub const fn with_max_reservation_hours(mut self, hours: u32) -> Self {
        self.max_reservation_hours = Some(hours);
        self
    }

    /// Marks the item as not reservable
    #[must_use]
    pub const fn not_reservable(mut self) -> Self {
        self.reservable = false;
        self
    }

    /// Checks whether the item can be bound for a session of the given length
    #[must_use]
    pub fn can_allocate_for(&self, session_length: Duration) -> bool {
        let within_limit = self
            .max_reservation_hours
            .is_none_or(|hours| session_length <= Duration::hours(i64::from(hours)));
        self.reservable && self.status == EquipmentStatus::Available && within_limit
    }
}

/// Result of a best-effort equipment allocation.
///
/// `allocated` is never empty when returned from a successful allocation of a
/// non-empty request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentAllocation {
    /// Items now bound to the reservation
    pub allocated: Vec<EquipmentId>,
    /// Requested items that could not be bound
    pub unavailable: Vec<EquipmentId>,
}

impl EquipmentAllocation {
    /// Allocation for a request that asked for no equipment
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            allocated: Vec::new(),
            unavailable: Vec::new(),
        }
    }

    /// Checks if some requested items were left out
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.unavailable.is_empty()
    }
}

// ============================================================================
// Reservations
// ============================================================================

/// Default reason recorded when a cancellation does not supply one
pub const DEFAULT_CANCELLATION_REASON: &str = "Cancelled by user";

/// Reservation entity.
///
/// Owned by the reservation ledger; every status change goes through
/// [`ReservationStatus::transition`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique reservation identifier
    pub id: ReservationId,
    /// Member holding the reservation
    pub user_id: UserId,
    /// Reserved session
    pub session_id: SessionId,
    /// Equipment bound to this reservation
    pub equipment_ids: Vec<EquipmentId>,
    /// Current status
    pub status: ReservationStatus,
    /// When the reservation was created
    pub reservation_date: DateTime<Utc>,
    /// Attendance outcome once marked
    pub attended: Option<bool>,
    /// Why the reservation was cancelled
    pub cancellation_reason: Option<String>,
    /// Who cancelled it
    pub cancelled_by_id: Option<UserId>,
    /// Who marked attendance
    pub completed_by_id: Option<UserId>,
    /// When attendance was marked
    pub completed_at: Option<DateTime<Utc>>,
    /// When the reservation was cancelled
    pub canceled_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Creates a new `Pending` reservation
    #[must_use]
    pub const fn new(
        id: ReservationId,
        user_id: UserId,
        session_id: SessionId,
        equipment_ids: Vec<EquipmentId>,
        reservation_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            session_id,
            equipment_ids,
            status: ReservationStatus::Pending,
            reservation_date,
            attended: None,
            cancellation_reason: None,
            cancelled_by_id: None,
            completed_by_id: None,
            completed_at: None,
            canceled_at: None,
        }
    }

    /// Checks if the reservation counts against the per-user limit
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Checks if the reservation still occupies a seat in its session
    #[must_use]
    pub const fn holds_slot(&self) -> bool {
        self.status.holds_slot()
    }

    /// `Pending -> Confirmed`
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if the reservation is not pending.
    pub fn confirm(&mut self) -> Result<(), InvalidTransition> {
        self.status = self.status.transition(ReservationStatus::Confirmed)?;
        Ok(())
    }

    /// `Pending | Confirmed -> Cancelled`, stamping the audit fields.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if the reservation is already terminal.
    pub fn cancel(
        &mut self,
        reason: Option<String>,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        self.status = self.status.transition(ReservationStatus::Cancelled)?;
        self.cancellation_reason =
            Some(reason.unwrap_or_else(|| DEFAULT_CANCELLATION_REASON.to_string()));
        self.cancelled_by_id = Some(actor);
        self.canceled_at = Some(at);
        Ok(())
    }

    /// `Confirmed -> Completed` when attended, `Confirmed -> Missed` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if the reservation is not confirmed.
    pub fn record_attendance(
        &mut self,
        attended: bool,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        let target = if attended {
            ReservationStatus::Completed
        } else {
            ReservationStatus::Missed
        };
        self.status = self.status.transition(target)?;
        self.attended = Some(attended);
        self.completed_by_id = Some(actor);
        self.completed_at = Some(at);
        Ok(())
    }
}

/// Caller request to reserve a slot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    /// Member making the reservation
    pub user_id: UserId,
    /// Session to reserve
    pub session_id: SessionId,
    /// Optional equipment to bind
    #[serde(default)]
    pub equipment_ids: Vec<EquipmentId>,
}

impl ReservationRequest {
    /// Request without equipment
    #[must_use]
    pub const fn new(user_id: UserId, session_id: SessionId) -> Self {
        Self {
            user_id,
            session_id,
            equipment_ids: Vec::new(),
        }
    }

    /// Adds equipment to the request
    #[must_use]
    pub fn with_equipment(mut self, equipment_ids: Vec<EquipmentId>) -> Self {
        self.equipment_ids = equipment_ids;
        self
    }
}

/// Read model returned to callers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationView {
    /// Reservation identifier
    pub id: ReservationId,
    /// Holder
    pub user_id: UserId,
    /// Reserved session
    pub session_id: SessionId,
    /// Creation timestamp
    pub reservation_date: DateTime<Utc>,
    /// Current status
    pub status: ReservationStatus,
    /// Bound equipment
    pub equipment_ids: Vec<EquipmentId>,
    /// Attendance outcome
    pub attended: Option<bool>,
    /// Cancellation reason
    pub cancellation_reason: Option<String>,
    /// Who cancelled it
    pub cancelled_by_id: Option<UserId>,
    /// Who marked attendance
    pub completed_by_id: Option<UserId>,
    /// When attendance was marked
    pub completed_at: Option<DateTime<Utc>>,
    /// When it was cancelled
    pub canceled_at: Option<DateTime<Utc>>,
}

impl From<&Reservation> for ReservationView {
    fn from(reservation: &Reservation) -> Self {
        Self {
            id: reservation.id,
            user_id: reservation.user_id,
            session_id: reservation.session_id,
            reservation_date: reservation.reservation_date,
            status: reservation.status,
            equipment_ids: reservation.equipment_ids.clone(),
            attended: reservation.attended,
            cancellation_reason: reservation.cancellation_reason.clone(),
            cancelled_by_id: reservation.cancelled_by_id,
            completed_by_id: reservation.completed_by_id,
            completed_at: reservation.completed_at,
            canceled_at: reservation.canceled_at,
        }
    }
}

/// Successful creation result: the reservation plus any equipment left out
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedReservation {
    /// The committed reservation
    pub reservation: ReservationView,
    /// Requested equipment that could not be bound
    pub unavailable_equipment: Vec<EquipmentId>,
}
