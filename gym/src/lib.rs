//! Gym Reservations - session booking engine for a gym or sports facility
//!
//! Trainers publish sessions with a fixed capacity; members reserve spots and
//! optionally equipment; reservations are cancelled or closed out with attendance.
//! The engine guarantees a session is never overbooked no matter how many callers
//! race for its last spot.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────────────────────┐
//!   callers ───────► │   ReservationService     │  clock, per-key locks, retry
//!                    └────────────┬─────────────┘
//!                                 │
//!                                 ▼
//!                    ┌──────────────────────────┐
//!                    │   ReservationLedger      │  state machine + rollback
//!                    └───┬──────────────────┬───┘
//!                        │                  │
//!                        ▼                  ▼
//!         ┌──────────────────┐    ┌──────────────────────┐
//!         │ SessionRegistry  │    │ EquipmentAllocator   │
//!         │ slot counters    │    │ best-effort binding  │
//!         └────────┬─────────┘    └──────────────────────┘
//!                  │
//!                  ▼
//!         ┌──────────────────┐    ┌──────────────────────┐
//!         │ ReservationStore │    │ Notifier (spawned)   │
//!         └──────────────────┘    └──────────────────────┘
//! ```
//!
//! # Key Features
//!
//! ## 1. Capacity Invariant
//!
//! ```text
//! reserved_spots < capacity  →  reserved_spots += 1   (one winner)
//! otherwise                  →  CapacityExceeded      (nothing changes)
//! ```
//!
//! Slot accounting is a compare-and-increment under the session's own mutex; the
//! facade additionally serializes each user so the active-reservation limit and
//! duplicate check cannot be raced.
//!
//! ## 2. Rollback
//!
//! Any failure after the slot is taken (no equipment, store write failure) releases
//! the slot and any bound equipment before the error is returned.
//!
//! ## 3. Cancellation Window
//!
//! Cancelling less than two hours (configurable) before the session starts is
//! rejected outright.
//!
//! # Example
//!
//! ```rust,no_run
//! use gym_reservations::{InMemoryReservationStore, ReservationService};
//! use gym_core::types::{ActorContext, ReservationRequest, Role, UserId};
//! use std::sync::Arc;
//!
//! # async fn run(spec: gym_core::types::SessionSpec) -> Result<(), Box<dyn std::error::Error>> {
//! let service = ReservationService::builder()
//!     .with_store(Arc::new(InMemoryReservationStore::new()))
//!     .build()?;
//!
//! let trainer = ActorContext::new(UserId::new(), Role::Trainer);
//! let session = service.create_session(spec, &trainer).await?;
//!
//! let member = UserId::new();
//! let created = service
//!     .create_reservation(
//!         ReservationRequest::new(member, session.id),
//!         &ActorContext::new(member, Role::Member),
//!     )
//!     .await?;
//! println!("{:?}", created.reservation.status);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod equipment;
pub mod ledger;
pub mod notifier;
pub mod registry;
pub mod service;
pub mod store;

pub use config::Config;
pub use equipment::EquipmentAllocator;
pub use ledger::{LedgerPolicy, ReservationLedger};
pub use notifier::LoggingNotifier;
pub use registry::{SessionRegistry, SlotToken};
pub use service::{ReservationService, ReservationServiceBuilder, ServiceBuildError};
pub use store::InMemoryReservationStore;
