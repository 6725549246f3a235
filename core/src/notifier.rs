//! Notifier collaborator.
//!
//! The engine only marks that something happened; delivery (email, push, in-app)
//! belongs to whoever implements [`Notifier`]. Notifications are dispatched after the
//! operation has committed and their outcome never changes the operation's result.

use crate::types::{ReservationId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// What happened to a reservation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// Reservation created and confirmed
    ReservationConfirmed,
    /// Reservation cancelled
    ReservationCancelled,
    /// Member attended
    AttendanceRecorded,
    /// Member did not show up
    MarkedMissed,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReservationConfirmed => "reservation_confirmed",
            Self::ReservationCancelled => "reservation_cancelled",
            Self::AttendanceRecorded => "attendance_recorded",
            Self::MarkedMissed => "marked_missed",
        };
        f.write_str(name)
    }
}

/// A single notification event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Recipient
    pub user_id: UserId,
    /// Event type
    pub kind: NotificationKind,
    /// Reservation the event is about
    pub related_entity_id: ReservationId,
    /// When the underlying change was committed
    pub occurred_at: DateTime<Utc>,
}

impl Notification {
    /// Creates a notification
    #[must_use]
    pub const fn new(
        user_id: UserId,
        kind: NotificationKind,
        related_entity_id: ReservationId,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            kind,
            related_entity_id,
            occurred_at,
        }
    }
}

/// Delivery failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Sink for notification events.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Hand one notification to the delivery channel.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the channel rejects it. The engine logs and drops it.
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}
