//! Property tests: arbitrary create/cancel sequences never break slot accounting.
//!
//! Each case replays a random workload against a fresh service and checks it step
//! by step against a simple model (set of members holding a spot).

#![allow(clippy::unwrap_used, clippy::expect_used)]

use gym_core::ReservationError;
use gym_core::environment::Clock;
use gym_core::types::{ActorContext, ReservationId, ReservationRequest, Role, UserId};
use gym_reservations::{InMemoryReservationStore, ReservationService};
use gym_testing::fixtures::{LedgerOp, ledger_ops};
use gym_testing::{SessionSpecBuilder, test_clock};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

const MEMBERS: usize = 6;

async fn replay(capacity: i64, ops: Vec<LedgerOp>) -> Result<(), TestCaseError> {
    let service = ReservationService::builder()
        .with_store(Arc::new(InMemoryReservationStore::new()))
        .with_clock(Arc::new(test_clock()))
        .build()
        .unwrap();
    let trainer = ActorContext::new(UserId::new(), Role::Trainer);
    let session = service
        .create_session(
            SessionSpecBuilder::new(test_clock().now().date_naive())
                .capacity(capacity)
                .build(),
            &trainer,
        )
        .await
        .unwrap();
    let members: Vec<ActorContext> = (0..MEMBERS)
        .map(|_| ActorContext::new(UserId::new(), Role::Member))
        .collect();
    let limit = usize::try_from(capacity).unwrap();

    // member index -> active reservation
    let mut holding: HashMap<usize, ReservationId> = HashMap::new();

    for op in ops {
        match op {
            LedgerOp::Create(n) => {
                let member = &members[n];
                let result = service
                    .create_reservation(ReservationRequest::new(member.user_id, session.id), member)
                    .await;
                match result {
                    Ok(created) => {
                        prop_assert!(!holding.contains_key(&n));
                        prop_assert!(holding.len() < limit);
                        holding.insert(n, created.reservation.id);
                    }
                    Err(ReservationError::DuplicateReservation { existing, .. }) => {
                        prop_assert_eq!(holding.get(&n), Some(&existing));
                    }
                    Err(ReservationError::CapacityExceeded { .. }) => {
                        prop_assert!(!holding.contains_key(&n));
                        prop_assert_eq!(holding.len(), limit);
                    }
                    Err(other) => return Err(TestCaseError::fail(format!("unexpected: {other}"))),
                }
            }
            LedgerOp::Cancel(n) => {
                if let Some(reservation_id) = holding.remove(&n) {
                    let cancelled = service
                        .cancel_reservation(reservation_id, None, &members[n])
                        .await;
                    prop_assert!(cancelled.is_ok(), "cancel failed: {:?}", cancelled);
                }
            }
        }

        let availability = service.session_availability(session.id).await.unwrap();
        let active = service
            .reservations_for_session(session.id)
            .await
            .unwrap()
            .iter()
            .filter(|r| r.status.is_active())
            .count();
        prop_assert!(active <= limit);
        prop_assert_eq!(active, holding.len());
        prop_assert_eq!(usize::try_from(availability.reserved).unwrap(), active);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_reserved_spots_track_active_reservations(
        capacity in 1i64..=4,
        ops in ledger_ops(MEMBERS, 40),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(replay(capacity, ops))?;
    }
}
