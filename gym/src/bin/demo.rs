//! Gym Reservations Demo
//!
//! Walks through the core reservation flow against the in-memory store:
//! - Session creation with a single spot
//! - A second member bouncing off the full session
//! - Cancellation freeing the spot, and the second member getting it
//! - Best-effort equipment allocation
//! - Attendance closing out a reservation
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin demo
//!
//! # More detail
//! RUST_LOG=debug cargo run --bin demo
//! ```

use anyhow::Context;
use chrono::{NaiveTime, Utc};
use gym_core::ReservationError;
use gym_core::types::{
    ActorContext, Equipment, EquipmentStatus, ReservationRequest, Role, SessionSpec, UserId,
};
use gym_reservations::{Config, InMemoryReservationStore, ReservationService};
use gym_runtime::metrics::MetricsServer;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gym_reservations=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::debug!(config = %serde_json::to_string(&config)?, "Configuration loaded");

    let mut metrics = MetricsServer::new(config.observability.metrics_socket_addr()?);
    metrics.start()?;

    println!("\n🏋️ ============================================");
    println!("   Gym Reservations - Live Demo");
    println!("============================================\n");

    let service = ReservationService::builder()
        .with_store(Arc::new(InMemoryReservationStore::new()))
        .with_config(config)
        .build()?;

    let trainer = ActorContext::new(UserId::new(), Role::Trainer);
    let alice = ActorContext::new(UserId::new(), Role::Member).with_institutional_id("M-1001");
    let bob = ActorContext::new(UserId::new(), Role::Member).with_institutional_id("M-1002");

    // ========== Step 1: one-spot session ==========

    println!("1️⃣  Creating a one-spot spin class tomorrow at 10:00...");
    let tomorrow = Utc::now()
        .date_naive()
        .succ_opt()
        .context("calendar overflow")?;
    let spin = service
        .create_session(
            SessionSpec {
                date: tomorrow,
                start_time: NaiveTime::from_hms_opt(10, 0, 0).context("invalid start time")?,
                end_time: NaiveTime::from_hms_opt(11, 0, 0).context("invalid end time")?,
                capacity: 1,
                trainer_id: trainer.user_id,
                location: "Spin Studio".to_string(),
                session_type: "SPIN".to_string(),
                description: Some("Morning intervals".to_string()),
            },
            &trainer,
        )
        .await?;
    println!("   ✓ Session {} ({} spot)\n", spin.id, spin.capacity);

    // ========== Step 2: capacity ==========

    println!("2️⃣  Alice reserves, then Bob tries...");
    let alice_res = service
        .create_reservation(ReservationRequest::new(alice.user_id, spin.id), &alice)
        .await?;
    println!("   ✓ Alice: {}", alice_res.reservation.status);

    match service
        .create_reservation(ReservationRequest::new(bob.user_id, spin.id), &bob)
        .await
    {
        Err(ReservationError::CapacityExceeded { .. }) => println!("   ✓ Bob rejected: session full\n"),
        other => anyhow::bail!("expected a full session, got {other:?}"),
    }

    // ========== Step 3: cancel and retry ==========

    println!("3️⃣  Alice cancels, Bob retries...");
    let cancelled = service
        .cancel_reservation(alice_res.reservation.id, None, &alice)
        .await?;
    println!(
        "   ✓ Alice: {} ({})",
        cancelled.status,
        cancelled.cancellation_reason.as_deref().unwrap_or_default()
    );
    let bob_res = service
        .create_reservation(ReservationRequest::new(bob.user_id, spin.id), &bob)
        .await?;
    let availability = service.session_availability(spin.id).await?;
    println!(
        "   ✓ Bob: {} ({}/{} reserved)\n",
        bob_res.reservation.status, availability.reserved, availability.capacity
    );

    // ========== Step 4: equipment ==========

    println!("4️⃣  Reserving a rack and a bike (bike in maintenance)...");
    let strength = service
        .create_session(
            SessionSpec {
                date: tomorrow,
                start_time: NaiveTime::from_hms_opt(12, 0, 0).context("invalid start time")?,
                end_time: NaiveTime::from_hms_opt(13, 0, 0).context("invalid end time")?,
                capacity: 8,
                trainer_id: trainer.user_id,
                location: "Weight Room".to_string(),
                session_type: "STRENGTH".to_string(),
                description: None,
            },
            &trainer,
        )
        .await?;
    let rack = service.register_equipment(Equipment::new("Squat Rack")).await;
    let bike = service.register_equipment(Equipment::new("Spin Bike")).await;
    service
        .set_equipment_status(bike, EquipmentStatus::Maintenance)
        .await?;

    let with_gear = service
        .create_reservation(
            ReservationRequest::new(alice.user_id, strength.id).with_equipment(vec![rack, bike]),
            &alice,
        )
        .await?;
    println!(
        "   ✓ Bound {} item(s), unavailable: {}\n",
        with_gear.reservation.equipment_ids.len(),
        with_gear.unavailable_equipment.len()
    );

    // ========== Step 5: attendance ==========

    println!("5️⃣  Trainer marks Alice as attended...");
    let done = service
        .mark_attendance(with_gear.reservation.id, true, &trainer)
        .await?;
    println!("   ✓ Alice: {}", done.status);
    println!(
        "   ✓ Equipment available again: {}\n",
        service.available_equipment().await.len()
    );

    // Notifications are dispatched on spawned tasks
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    if let Some(rendered) = metrics.render() {
        println!("📊 Metrics ({})\n", metrics.addr());
        for line in rendered.lines().filter(|l| l.starts_with("gym_")) {
            println!("   {line}");
        }
    }

    println!("\n✅ Demo complete");
    Ok(())
}
