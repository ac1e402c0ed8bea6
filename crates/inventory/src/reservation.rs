//! Reservation engine: the only mutator of inventory rows.
//!
//! Single-listing operations lock one row. Multi-listing reservations and
//! releases lock all of their rows in ascending listing order and apply as one
//! unit, so a caller never observes half of a batch applied.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use foodrescue_core::{ListingId, StoreId};

use crate::error::InventoryError;
use crate::inventory::Inventory;
use crate::store::{InventoryStore, LockWait};

/// Quantity requested from one listing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationLine {
    pub listing_id: ListingId,
    pub quantity: u32,
}

impl ReservationLine {
    pub fn new(listing_id: ListingId, quantity: u32) -> Self {
        Self { listing_id, quantity }
    }
}

#[derive(Debug)]
pub struct ReservationEngine<S> {
    store: S,
}

impl<S> ReservationEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> ReservationEngine<S>
where
    S: InventoryStore,
{
    /// Create the inventory row that accompanies a new listing.
    pub fn register(
        &self,
        listing_id: ListingId,
        store_id: StoreId,
        qty_available: u32,
        at: DateTime<Utc>,
    ) -> Result<Inventory, InventoryError> {
        let inventory = self
            .store
            .register(Inventory::new(listing_id, store_id, qty_available, at))?;
        tracing::info!(%listing_id, %store_id, qty_available, "inventory registered");
        Ok(inventory)
    }

    pub fn get(&self, listing_id: ListingId) -> Result<Inventory, InventoryError> {
        self.store.get(listing_id)
    }

    /// Rows belonging to one store, in listing order.
    pub fn list_for_store(&self, store_id: StoreId) -> Vec<Inventory> {
        self.store
            .list()
            .into_iter()
            .filter(|inv| inv.store_id == store_id)
            .collect()
    }

    /// Advisory stock check without taking the row lock.
    ///
    /// Only good for failing fast; the answer can be stale by the time the
    /// caller acts on it. `decrement` is the real guard.
    pub fn check_available(&self, listing_id: ListingId, qty: u32) -> Result<bool, InventoryError> {
        Ok(self.store.get(listing_id)?.has_available(qty))
    }

    /// Take `qty` units, re-checking availability under the row lock.
    pub fn decrement(
        &self,
        listing_id: ListingId,
        qty: u32,
        at: DateTime<Utc>,
    ) -> Result<Inventory, InventoryError> {
        let updated = self.store.update(listing_id, at, &mut |inv| {
            if inv.qty_available < qty {
                return Err(InventoryError::InsufficientStock {
                    listing_id,
                    requested: qty,
                    available: inv.qty_available,
                });
            }
            inv.qty_available -= qty;
            inv.qty_reserved = inv.qty_reserved.saturating_add(qty);
            Ok(())
        });

        match &updated {
            Ok(inv) => {
                tracing::debug!(%listing_id, qty, remaining = inv.qty_available, "stock decremented")
            }
            Err(InventoryError::InsufficientStock { available, .. }) => {
                tracing::info!(%listing_id, requested = qty, available, "decrement refused: insufficient stock")
            }
            Err(e) => tracing::warn!(%listing_id, qty, error = %e, "decrement failed"),
        }
        updated
    }

    /// Give `qty` units back.
    pub fn restore(
        &self,
        listing_id: ListingId,
        qty: u32,
        at: DateTime<Utc>,
    ) -> Result<Inventory, InventoryError> {
        let updated = self.store.update(listing_id, at, &mut |inv| {
            inv.qty_available = inv
                .qty_available
                .checked_add(qty)
                .ok_or(InventoryError::Overflow(listing_id))?;
            inv.qty_reserved = inv.qty_reserved.saturating_sub(qty);
            Ok(())
        })?;
        tracing::debug!(%listing_id, qty, available = updated.qty_available, "stock restored");
        Ok(updated)
    }

    /// Supplier restock (`delta > 0`) or spoilage write-off (`delta < 0`).
    pub fn adjust(
        &self,
        listing_id: ListingId,
        delta: i64,
        at: DateTime<Utc>,
    ) -> Result<Inventory, InventoryError> {
        let updated = self.store.update(listing_id, at, &mut |inv| {
            let invalid = InventoryError::InvalidAdjustment {
                listing_id,
                delta,
                available: inv.qty_available,
            };
            if delta == 0 {
                return Err(invalid);
            }
            let next = i64::from(inv.qty_available) + delta;
            if next < 0 {
                return Err(invalid);
            }
            inv.qty_available = u32::try_from(next).map_err(|_| InventoryError::Overflow(listing_id))?;
            Ok(())
        })?;
        tracing::info!(%listing_id, delta, available = updated.qty_available, "inventory adjusted");
        Ok(updated)
    }

    /// Decrement every line or none of them.
    ///
    /// Lines for the same listing are merged. All rows are checked and written
    /// under their locks together, so a shortage on any line leaves every row
    /// untouched.
    pub fn reserve_all(
        &self,
        lines: &[ReservationLine],
        at: DateTime<Utc>,
    ) -> Result<Vec<Inventory>, InventoryError> {
        let wanted = merge_lines(lines)?;
        let ids: Vec<ListingId> = wanted.keys().copied().collect();

        let reserved = self.store.update_many(&ids, at, LockWait::Bounded, &mut |inv| {
            let qty = wanted.get(&inv.listing_id).copied().unwrap_or(0);
            if inv.qty_available < qty {
                return Err(InventoryError::InsufficientStock {
                    listing_id: inv.listing_id,
                    requested: qty,
                    available: inv.qty_available,
                });
            }
            inv.qty_available -= qty;
            inv.qty_reserved = inv.qty_reserved.saturating_add(qty);
            Ok(())
        });

        match &reserved {
            Ok(_) => tracing::debug!(listings = ids.len(), "reservation taken"),
            Err(InventoryError::InsufficientStock { listing_id, requested, available }) => {
                tracing::info!(%listing_id, requested, available, "reservation refused: insufficient stock")
            }
            Err(e) => tracing::warn!(error = %e, "reservation failed"),
        }
        reserved
    }

    /// Restore every line or none of them.
    ///
    /// A busy row fails the whole release with `LockTimeout` and nothing is
    /// restored, so the caller can retry without returning any unit twice.
    pub fn release_all(
        &self,
        lines: &[ReservationLine],
        at: DateTime<Utc>,
    ) -> Result<Vec<Inventory>, InventoryError> {
        self.restore_lines(lines, at, LockWait::Bounded)
    }

    /// Undo a reservation this caller made moments ago.
    ///
    /// Waits for busy rows instead of timing out: giving up here would leave
    /// the units taken with nothing holding them. Only arithmetic overflow or a
    /// missing row can still fail it.
    pub fn compensate(
        &self,
        lines: &[ReservationLine],
        at: DateTime<Utc>,
    ) -> Result<Vec<Inventory>, InventoryError> {
        self.restore_lines(lines, at, LockWait::Unbounded)
            .inspect_err(|err| tracing::error!(error = %err, "compensating release failed; stock is short until corrected"))
    }

    fn restore_lines(
        &self,
        lines: &[ReservationLine],
        at: DateTime<Utc>,
        wait: LockWait,
    ) -> Result<Vec<Inventory>, InventoryError> {
        let returned = merge_lines(lines)?;
        let ids: Vec<ListingId> = returned.keys().copied().collect();

        let rows = self.store.update_many(&ids, at, wait, &mut |inv| {
            let qty = returned.get(&inv.listing_id).copied().unwrap_or(0);
            inv.qty_available = inv
                .qty_available
                .checked_add(qty)
                .ok_or(InventoryError::Overflow(inv.listing_id))?;
            inv.qty_reserved = inv.qty_reserved.saturating_sub(qty);
            Ok(())
        })?;
        tracing::debug!(listings = ids.len(), "stock released");
        Ok(rows)
    }
}

/// Merge duplicate listings, keyed in listing order.
fn merge_lines(lines: &[ReservationLine]) -> Result<BTreeMap<ListingId, u32>, InventoryError> {
    let mut merged: BTreeMap<ListingId, u32> = BTreeMap::new();
    for line in lines {
        let slot = merged.entry(line.listing_id).or_insert(0);
        *slot = slot
            .checked_add(line.quantity)
            .ok_or(InventoryError::Overflow(line.listing_id))?;
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryInventoryStore;
    use std::sync::{Arc, Barrier};

    fn l(n: u64) -> ListingId {
        ListingId::new(n)
    }

    fn engine_with(stock: &[(u64, u32)]) -> ReservationEngine<InMemoryInventoryStore> {
        let engine = ReservationEngine::new(InMemoryInventoryStore::new());
        for (id, qty) in stock {
            engine.register(l(*id), StoreId::new(1), *qty, Utc::now()).unwrap();
        }
        engine
    }

    #[test]
    fn decrement_takes_units_and_tracks_reserved() {
        let engine = engine_with(&[(1, 5)]);
        let inv = engine.decrement(l(1), 3, Utc::now()).unwrap();
        assert_eq!(inv.qty_available, 2);
        assert_eq!(inv.qty_reserved, 3);
    }

    #[test]
    fn decrement_refuses_to_oversell() {
        let engine = engine_with(&[(1, 2)]);
        let err = engine.decrement(l(1), 3, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            InventoryError::InsufficientStock {
                listing_id: l(1),
                requested: 3,
                available: 2,
            }
        );
        assert_eq!(engine.get(l(1)).unwrap().qty_available, 2);
    }

    #[test]
    fn list_for_store_only_returns_that_store() {
        let engine = engine_with(&[(3, 1), (1, 2)]);
        engine.register(l(2), StoreId::new(9), 4, Utc::now()).unwrap();

        let mine = engine.list_for_store(StoreId::new(1));
        assert_eq!(mine.iter().map(|i| i.listing_id).collect::<Vec<_>>(), vec![l(1), l(3)]);
        assert_eq!(engine.list_for_store(StoreId::new(9)).len(), 1);
        assert!(engine.list_for_store(StoreId::new(5)).is_empty());
    }

    #[test]
    fn check_available_is_advisory_only() {
        let engine = engine_with(&[(1, 2)]);
        assert!(engine.check_available(l(1), 2).unwrap());
        assert!(!engine.check_available(l(1), 3).unwrap());
        assert_eq!(
            engine.check_available(l(9), 1).unwrap_err(),
            InventoryError::NotFound(l(9))
        );
    }

    #[test]
    fn adjust_restocks_and_writes_off() {
        let engine = engine_with(&[(1, 4)]);
        assert_eq!(engine.adjust(l(1), 6, Utc::now()).unwrap().qty_available, 10);
        assert_eq!(engine.adjust(l(1), -10, Utc::now()).unwrap().qty_available, 0);
    }

    #[test]
    fn adjust_below_zero_is_invalid() {
        let engine = engine_with(&[(1, 4)]);
        let err = engine.adjust(l(1), -5, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            InventoryError::InvalidAdjustment {
                listing_id: l(1),
                delta: -5,
                available: 4,
            }
        );
        assert_eq!(engine.get(l(1)).unwrap().qty_available, 4);
    }

    #[test]
    fn zero_adjustment_is_invalid() {
        let engine = engine_with(&[(1, 4)]);
        assert!(matches!(
            engine.adjust(l(1), 0, Utc::now()),
            Err(InventoryError::InvalidAdjustment { .. })
        ));
    }

    #[test]
    fn restore_reports_overflow_instead_of_wrapping() {
        let engine = engine_with(&[(1, u32::MAX)]);
        assert_eq!(
            engine.restore(l(1), 1, Utc::now()).unwrap_err(),
            InventoryError::Overflow(l(1))
        );
    }

    #[test]
    fn reserve_all_takes_nothing_on_a_shortage() {
        let engine = engine_with(&[(1, 5), (2, 0)]);
        let lines = [ReservationLine::new(l(1), 3), ReservationLine::new(l(2), 1)];

        let err = engine.reserve_all(&lines, Utc::now()).unwrap_err();

        assert_eq!(
            err,
            InventoryError::InsufficientStock {
                listing_id: l(2),
                requested: 1,
                available: 0,
            }
        );
        let l1 = engine.get(l(1)).unwrap();
        assert_eq!(l1.qty_available, 5);
        assert_eq!(l1.qty_reserved, 0);
    }

    #[test]
    fn reserve_all_merges_lines_for_the_same_listing() {
        let engine = engine_with(&[(1, 3)]);
        let lines = [ReservationLine::new(l(1), 2), ReservationLine::new(l(1), 2)];
        assert!(matches!(
            engine.reserve_all(&lines, Utc::now()),
            Err(InventoryError::InsufficientStock { requested: 4, available: 3, .. })
        ));
        assert_eq!(engine.get(l(1)).unwrap().qty_available, 3);
    }

    #[test]
    fn release_all_returns_what_reserve_all_took() {
        let engine = engine_with(&[(1, 5), (2, 7)]);
        let lines = [ReservationLine::new(l(2), 7), ReservationLine::new(l(1), 1)];

        let taken = engine.reserve_all(&lines, Utc::now()).unwrap();
        assert_eq!(taken.iter().map(|i| i.listing_id).collect::<Vec<_>>(), vec![l(1), l(2)]);

        engine.release_all(&lines, Utc::now()).unwrap();
        assert_eq!(engine.get(l(1)).unwrap().qty_available, 5);
        assert_eq!(engine.get(l(2)).unwrap().qty_available, 7);
    }

    fn engine_with_timeout(
        timeout: std::time::Duration,
        stock: &[(u64, u32)],
    ) -> Arc<ReservationEngine<Arc<InMemoryInventoryStore>>> {
        let engine = ReservationEngine::new(Arc::new(InMemoryInventoryStore::with_lock_timeout(timeout)));
        for (id, qty) in stock {
            engine.register(l(*id), StoreId::new(1), *qty, Utc::now()).unwrap();
        }
        Arc::new(engine)
    }

    /// Keep `listing` locked on another thread until the returned sender fires.
    fn hold(
        engine: &Arc<ReservationEngine<Arc<InMemoryInventoryStore>>>,
        listing: ListingId,
    ) -> (std::thread::JoinHandle<()>, std::sync::mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let store = Arc::clone(engine.store());
        let holder = std::thread::spawn(move || {
            store
                .update(listing, Utc::now(), &mut |_inv| {
                    entered_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok(())
                })
                .unwrap();
        });
        entered_rx.recv().unwrap();
        (holder, release_tx)
    }

    #[test]
    fn release_all_on_a_busy_row_restores_nothing() {
        let engine = engine_with_timeout(std::time::Duration::from_millis(20), &[(1, 5), (2, 5)]);
        let lines = [ReservationLine::new(l(1), 3), ReservationLine::new(l(2), 3)];
        engine.reserve_all(&lines, Utc::now()).unwrap();

        let (holder, release) = hold(&engine, l(2));
        let err = engine.release_all(&lines, Utc::now()).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(engine.get(l(1)).unwrap().qty_available, 2);
        release.send(()).unwrap();
        holder.join().unwrap();

        // The retry returns each unit exactly once.
        engine.release_all(&lines, Utc::now()).unwrap();
        assert_eq!(engine.get(l(1)).unwrap().qty_available, 5);
        assert_eq!(engine.get(l(2)).unwrap().qty_available, 5);
    }

    #[test]
    fn compensate_waits_for_a_busy_row() {
        let engine = engine_with_timeout(std::time::Duration::from_millis(20), &[(1, 5), (2, 5)]);
        let lines = [ReservationLine::new(l(1), 3), ReservationLine::new(l(2), 3)];
        engine.reserve_all(&lines, Utc::now()).unwrap();

        let (holder, release) = hold(&engine, l(2));
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(100));
            release.send(()).unwrap();
        });

        engine.compensate(&lines, Utc::now()).unwrap();
        assert_eq!(engine.get(l(1)).unwrap().qty_available, 5);
        assert_eq!(engine.get(l(2)).unwrap().qty_available, 5);

        releaser.join().unwrap();
        holder.join().unwrap();
    }

    #[test]
    fn compensate_reports_overflow_and_changes_nothing() {
        let engine = engine_with(&[(1, 5), (2, u32::MAX)]);
        let lines = [ReservationLine::new(l(1), 2), ReservationLine::new(l(2), 1)];
        assert_eq!(
            engine.compensate(&lines, Utc::now()).unwrap_err(),
            InventoryError::Overflow(l(2))
        );
        assert_eq!(engine.get(l(1)).unwrap().qty_available, 5);
    }

    #[test]
    fn concurrent_decrements_never_oversell() {
        let engine = Arc::new(engine_with(&[(1, 50)]));
        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));

        let successes: u32 = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    let engine = Arc::clone(&engine);
                    let barrier = Arc::clone(&barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        let mut ok = 0u32;
                        for _ in 0..10 {
                            if engine.decrement(l(1), 1, Utc::now()).is_ok() {
                                ok += 1;
                            }
                        }
                        ok
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(successes, 50);
        assert_eq!(engine.get(l(1)).unwrap().qty_available, 0);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Final stock equals initial minus successful decrements and never underflows.
            #[test]
            fn decrements_account_exactly(
                initial in 0u32..200,
                requests in proptest::collection::vec(0u32..30, 0..40)
            ) {
                let engine = engine_with(&[(1, initial)]);
                let mut taken = 0u32;
                for qty in &requests {
                    match engine.decrement(l(1), *qty, Utc::now()) {
                        Ok(_) => taken += qty,
                        Err(InventoryError::InsufficientStock { available, .. }) => {
                            prop_assert!(available < *qty);
                        }
                        Err(other) => prop_assert!(false, "unexpected error {other:?}"),
                    }
                }
                prop_assert_eq!(engine.get(l(1)).unwrap().qty_available, initial - taken);
            }

            /// Restoring what was decremented returns the listing to its prior level.
            #[test]
            fn restore_undoes_decrement(initial in 0u32..1000, qty in 0u32..1000) {
                let engine = engine_with(&[(1, initial)]);
                if engine.decrement(l(1), qty, Utc::now()).is_ok() {
                    engine.restore(l(1), qty, Utc::now()).unwrap();
                }
                prop_assert_eq!(engine.get(l(1)).unwrap().qty_available, initial);
            }
        }
    }
}
