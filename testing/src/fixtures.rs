//! Fixture builders and proptest strategies.

use chrono::{NaiveDate, NaiveTime};
use gym_core::types::{Equipment, SessionSpec, UserId};
use proptest::prelude::*;

/// Builder for [`SessionSpec`] with sensible defaults.
///
/// Defaults: 10:00-11:00, capacity 10, a fresh trainer, location `"Studio A"`,
/// session type `"YOGA"`, no description.
#[derive(Debug, Clone)]
pub struct SessionSpecBuilder {
    spec: SessionSpec,
}

impl SessionSpecBuilder {
    /// Start building a session on `date`
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self {
            spec: SessionSpec {
                date,
                start_time: hm(10, 0),
                end_time: hm(11, 0),
                capacity: 10,
                trainer_id: UserId::new(),
                location: "Studio A".to_string(),
                session_type: "YOGA".to_string(),
                description: None,
            },
        }
    }

    /// Set the time window
    #[must_use]
    pub fn window(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.spec.start_time = start;
        self.spec.end_time = end;
        self
    }

    /// Set the raw (unvalidated) capacity
    #[must_use]
    pub const fn capacity(mut self, capacity: i64) -> Self {
        self.spec.capacity = capacity;
        self
    }

    /// Set the trainer
    #[must_use]
    pub const fn trainer(mut self, trainer_id: UserId) -> Self {
        self.spec.trainer_id = trainer_id;
        self
    }

    /// Set the location
    #[must_use]
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.spec.location = location.into();
        self
    }

    /// Set the session type
    #[must_use]
    pub fn session_type(mut self, session_type: impl Into<String>) -> Self {
        self.spec.session_type = session_type.into();
        self
    }

    /// Set a description
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.spec.description = Some(description.into());
        self
    }

    /// Finish
    #[must_use]
    pub fn build(self) -> SessionSpec {
        self.spec
    }
}

/// Wall-clock time from hours and minutes; out-of-range input clamps to midnight.
#[must_use]
pub fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}

/// A handful of reservable items for equipment tests.
#[must_use]
pub fn equipment_rack() -> Vec<Equipment> {
    vec![
        Equipment::new("Kettlebell 16kg"),
        Equipment::new("Yoga mat"),
        Equipment::new("Rowing machine").with_max_reservation_hours(1),
        Equipment::new("Squat rack"),
    ]
}

/// One step in a randomly generated ledger workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOp {
    /// Member `n` tries to reserve
    Create(usize),
    /// Member `n` cancels their active reservation, if any
    Cancel(usize),
}

/// Strategy for a sequence of creates and cancels among `members` members.
pub fn ledger_ops(members: usize, max_len: usize) -> impl Strategy<Value = Vec<LedgerOp>> {
    let member = 0..members.max(1);
    let op = prop_oneof![
        3 => member.clone().prop_map(LedgerOp::Create),
        1 => member.prop_map(LedgerOp::Cancel),
    ];
    prop::collection::vec(op, 1..=max_len.max(1))
}
