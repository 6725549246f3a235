//! Equipment Allocator.
//!
//! Tracks equipment status and binds items to reservations. Allocation is
//! best-effort: whatever subset of the request is available gets bound, the rest
//! is reported back, and only a request with nothing available fails.

use chrono::Duration;
use gym_core::ReservationError;
use gym_core::types::{Equipment, EquipmentAllocation, EquipmentId, EquipmentStatus};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// Equipment catalogue and allocator.
#[derive(Debug, Default)]
pub struct EquipmentAllocator {
    items: RwLock<HashMap<EquipmentId, Equipment>>,
}

impl EquipmentAllocator {
    /// Create an empty catalogue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an item
    pub async fn register(&self, equipment: Equipment) -> EquipmentId {
        let id = equipment.id;
        tracing::debug!(equipment_id = %id, name = %equipment.name, "Equipment registered");
        self.items.write().await.insert(id, equipment);
        id
    }

    /// Look up one item
    pub async fn get(&self, id: EquipmentId) -> Option<Equipment> {
        self.items.read().await.get(&id).cloned()
    }

    /// Force an item's status (maintenance workflow hook).
    ///
    /// Returns the updated item, or `None` for unknown ids.
    pub async fn set_status(&self, id: EquipmentId, status: EquipmentStatus) -> Option<Equipment> {
        let mut items = self.items.write().await;
        let item = items.get_mut(&id)?;
        if item.status != status {
            tracing::info!(equipment_id = %id, from = ?item.status, to = ?status, "Equipment status changed");
            item.status = status;
        }
        Some(item.clone())
    }

    /// Reservable items that are currently available, ordered by name
    pub async fn available(&self) -> Vec<Equipment> {
        let mut available: Vec<Equipment> = self
            .items
            .read()
            .await
            .values()
            .filter(|e| e.reservable && e.status == EquipmentStatus::Available)
            .cloned()
            .collect();
        available.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        available
    }

    /// Bind every requested item that can be held for `session_length`.
    ///
    /// Unknown, non-reservable, non-available and over-limit items are reported in
    /// `unavailable`. Repeated ids count once. An empty request allocates nothing.
    ///
    /// # Errors
    ///
    /// Returns `NoEquipmentAvailable` if the request is non-empty and no item could be
    /// bound; in that case nothing changed.
    pub async fn try_allocate(
        &self,
        requested: &[EquipmentId],
        session_length: Duration,
    ) -> Result<EquipmentAllocation, ReservationError> {
        if requested.is_empty() {
            return Ok(EquipmentAllocation::empty());
        }

        let mut seen = HashSet::with_capacity(requested.len());
        let unique: Vec<EquipmentId> = requested
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let mut items = self.items.write().await;
        let (allocatable, unavailable): (Vec<EquipmentId>, Vec<EquipmentId>) =
            unique.iter().copied().partition(|id| {
                items
                    .get(id)
                    .is_some_and(|item| item.can_allocate_for(session_length))
            });

        if allocatable.is_empty() {
            tracing::debug!(requested = ?unique, "No requested equipment available");
            return Err(ReservationError::NoEquipmentAvailable { requested: unique });
        }

        for id in &allocatable {
            if let Some(item) = items.get_mut(id) {
                item.status = EquipmentStatus::Reserved;
            }
        }

        if !unavailable.is_empty() {
            tracing::debug!(
                allocated = ?allocatable,
                unavailable = ?unavailable,
                "Partial equipment allocation"
            );
        }
        Ok(EquipmentAllocation {
            allocated: allocatable,
            unavailable,
        })
    }

    /// Return items to AVAILABLE.
    ///
    /// Only RESERVED items change; releasing an available, maintenance or unknown
    /// item is a no-op. Returns how many items were actually released.
    pub async fn release(&self, ids: &[EquipmentId]) -> usize {
        if ids.is_empty() {
            return 0;
        }

        let mut items = self.items.write().await;
        let mut released = 0;
        for id in ids {
            match items.get_mut(id) {
                Some(item) if item.status == EquipmentStatus::Reserved => {
                    item.status = EquipmentStatus::Available;
                    released += 1;
                }
                _ => {}
            }
        }
        if released > 0 {
            tracing::debug!(released, "Equipment released");
        }
        released
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn allocator_with(items: Vec<Equipment>) -> (EquipmentAllocator, Vec<EquipmentId>) {
        let allocator = EquipmentAllocator::new();
        let mut ids = Vec::new();
        for item in items {
            ids.push(allocator.register(item).await);
        }
        (allocator, ids)
    }

    #[tokio::test]
    async fn test_partial_allocation_binds_available_subset() {
        let (allocator, ids) =
            allocator_with(vec![Equipment::new("Mat"), Equipment::new("Bike")]).await;
        allocator.set_status(ids[1], EquipmentStatus::Maintenance).await.unwrap();

        let allocation = allocator.try_allocate(&ids, Duration::hours(1)).await.unwrap();
        assert_eq!(allocation.allocated, vec![ids[0]]);
        assert_eq!(allocation.unavailable, vec![ids[1]]);
        assert!(allocation.is_partial());
        assert_eq!(
            allocator.get(ids[0]).await.unwrap().status,
            EquipmentStatus::Reserved
        );
    }

    #[tokio::test]
    async fn test_nothing_available_fails_without_side_effects() {
        let (allocator, ids) =
            allocator_with(vec![Equipment::new("Bench").not_reservable()]).await;
        let unknown = EquipmentId::new();

        let err = allocator
            .try_allocate(&[ids[0], unknown], Duration::hours(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReservationError::NoEquipmentAvailable { ref requested } if requested.len() == 2
        ));
        assert_eq!(
            allocator.get(ids[0]).await.unwrap().status,
            EquipmentStatus::Available
        );
    }

    #[tokio::test]
    async fn test_hold_limit_makes_item_unavailable_for_long_sessions() {
        let (allocator, ids) = allocator_with(vec![
            Equipment::new("Rower").with_max_reservation_hours(1),
            Equipment::new("Mat"),
        ])
        .await;

        let allocation = allocator.try_allocate(&ids, Duration::minutes(90)).await.unwrap();
        assert_eq!(allocation.allocated, vec![ids[1]]);
        assert_eq!(allocation.unavailable, vec![ids[0]]);
    }

    #[tokio::test]
    async fn test_duplicate_ids_collapse() {
        let (allocator, ids) = allocator_with(vec![Equipment::new("Mat")]).await;
        let allocation = allocator
            .try_allocate(&[ids[0], ids[0]], Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(allocation.allocated, vec![ids[0]]);
        assert!(allocation.unavailable.is_empty());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (allocator, ids) = allocator_with(vec![Equipment::new("Mat")]).await;
        allocator.try_allocate(&ids, Duration::hours(1)).await.unwrap();

        assert_eq!(allocator.release(&ids).await, 1);
        let after_first = allocator.get(ids[0]).await.unwrap();
        assert_eq!(allocator.release(&ids).await, 0);
        assert_eq!(allocator.get(ids[0]).await.unwrap(), after_first);
        assert_eq!(after_first.status, EquipmentStatus::Available);
    }

    #[tokio::test]
    async fn test_release_leaves_maintenance_alone() {
        let (allocator, ids) = allocator_with(vec![Equipment::new("Bike")]).await;
        allocator.set_status(ids[0], EquipmentStatus::Maintenance).await;
        assert_eq!(allocator.release(&ids).await, 0);
        assert_eq!(
            allocator.get(ids[0]).await.unwrap().status,
            EquipmentStatus::Maintenance
        );
        assert!(allocator.available().await.is_empty());
    }
}
