//! Inventory rows and their per-listing critical section.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};

use foodrescue_core::ListingId;

use crate::error::InventoryError;
use crate::inventory::Inventory;

/// How long a writer may wait for a row lock.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LockWait {
    /// Give up with `LockTimeout` after the store's configured timeout.
    Bounded,
    /// Wait until the row is free. Only for undoing a change the caller itself
    /// just made, where giving up would lose stock.
    Unbounded,
}

/// Storage boundary for inventory rows.
///
/// `update` and `update_many` are the only ways to change a row. They must hold
/// an exclusive lock on every row involved for the whole read-modify-write, and
/// must persist nothing when the closure fails for any row.
pub trait InventoryStore: Send + Sync {
    /// Create the row for a listing.
    fn register(&self, inventory: Inventory) -> Result<Inventory, InventoryError>;

    /// Snapshot of a row. Not serialized with writers; may be stale.
    fn get(&self, listing_id: ListingId) -> Result<Inventory, InventoryError>;

    fn list(&self) -> Vec<Inventory>;

    /// Locked read-modify-write of one row.
    ///
    /// On success `last_updated` is set to `at` and the new row is returned.
    fn update(
        &self,
        listing_id: ListingId,
        at: DateTime<Utc>,
        mutate: &mut dyn FnMut(&mut Inventory) -> Result<(), InventoryError>,
    ) -> Result<Inventory, InventoryError>;

    /// Locked read-modify-write of several rows as one unit.
    ///
    /// Rows are locked in ascending listing order and all stay locked until
    /// every row has been mutated; either every row is written or none is.
    /// Duplicate ids are ignored. Rows come back in ascending listing order.
    fn update_many(
        &self,
        listing_ids: &[ListingId],
        at: DateTime<Utc>,
        wait: LockWait,
        mutate: &mut dyn FnMut(&mut Inventory) -> Result<(), InventoryError>,
    ) -> Result<Vec<Inventory>, InventoryError>;
}

impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    fn register(&self, inventory: Inventory) -> Result<Inventory, InventoryError> {
        (**self).register(inventory)
    }

    fn get(&self, listing_id: ListingId) -> Result<Inventory, InventoryError> {
        (**self).get(listing_id)
    }

    fn list(&self) -> Vec<Inventory> {
        (**self).list()
    }

    fn update(
        &self,
        listing_id: ListingId,
        at: DateTime<Utc>,
        mutate: &mut dyn FnMut(&mut Inventory) -> Result<(), InventoryError>,
    ) -> Result<Inventory, InventoryError> {
        (**self).update(listing_id, at, mutate)
    }

    fn update_many(
        &self,
        listing_ids: &[ListingId],
        at: DateTime<Utc>,
        wait: LockWait,
        mutate: &mut dyn FnMut(&mut Inventory) -> Result<(), InventoryError>,
    ) -> Result<Vec<Inventory>, InventoryError> {
        (**self).update_many(listing_ids, at, wait, mutate)
    }
}

/// One row: a writer lock plus the published state.
///
/// Writers serialize on `write_lock` for their entire read-modify-write and
/// publish into `state` at the end. Snapshot readers only touch `state`, so a
/// slow writer never blocks an advisory read.
#[derive(Debug)]
struct Row {
    write_lock: Mutex<()>,
    state: RwLock<Inventory>,
}

/// In-memory inventory store.
///
/// Rows for different listings never contend; the outer map lock is held only
/// long enough to find a row.
#[derive(Debug)]
pub struct InMemoryInventoryStore {
    rows: RwLock<HashMap<ListingId, Arc<Row>>>,
    lock_timeout: Duration,
}

impl InMemoryInventoryStore {
    pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new() -> Self {
        Self::with_lock_timeout(Self::DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            lock_timeout,
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    fn row(&self, listing_id: ListingId) -> Result<Arc<Row>, InventoryError> {
        self.rows
            .read()
            .get(&listing_id)
            .cloned()
            .ok_or(InventoryError::NotFound(listing_id))
    }

    fn lock_row<'a>(
        &self,
        listing_id: ListingId,
        row: &'a Row,
        wait: LockWait,
    ) -> Result<MutexGuard<'a, ()>, InventoryError> {
        match wait {
            LockWait::Unbounded => Ok(row.write_lock.lock()),
            LockWait::Bounded => row.write_lock.try_lock_for(self.lock_timeout).ok_or_else(|| {
                let waited_ms = self.lock_timeout.as_millis() as u64;
                tracing::warn!(%listing_id, timeout_ms = waited_ms, "inventory lock wait timed out");
                InventoryError::LockTimeout { listing_id, waited_ms }
            }),
        }
    }
}

impl Default for InMemoryInventoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn register(&self, inventory: Inventory) -> Result<Inventory, InventoryError> {
        let mut rows = self.rows.write();
        if rows.contains_key(&inventory.listing_id) {
            return Err(InventoryError::AlreadyRegistered(inventory.listing_id));
        }
        rows.insert(
            inventory.listing_id,
            Arc::new(Row {
                write_lock: Mutex::new(()),
                state: RwLock::new(inventory.clone()),
            }),
        );
        Ok(inventory)
    }

    fn get(&self, listing_id: ListingId) -> Result<Inventory, InventoryError> {
        let row = self.row(listing_id)?;
        let snapshot = row.state.read().clone();
        Ok(snapshot)
    }

    fn list(&self) -> Vec<Inventory> {
        let rows: Vec<Arc<Row>> = self.rows.read().values().cloned().collect();
        let mut all: Vec<Inventory> = rows.iter().map(|r| r.state.read().clone()).collect();
        all.sort_by_key(|i| i.listing_id);
        all
    }

    fn update(
        &self,
        listing_id: ListingId,
        at: DateTime<Utc>,
        mutate: &mut dyn FnMut(&mut Inventory) -> Result<(), InventoryError>,
    ) -> Result<Inventory, InventoryError> {
        let row = self.row(listing_id)?;
        let _guard = self.lock_row(listing_id, &row, LockWait::Bounded)?;

        // Re-read under the lock; anything observed before acquiring it is stale.
        let mut draft = row.state.read().clone();
        mutate(&mut draft)?;
        draft.last_updated = at;

        *row.state.write() = draft.clone();
        Ok(draft)
    }

    fn update_many(
        &self,
        listing_ids: &[ListingId],
        at: DateTime<Utc>,
        wait: LockWait,
        mutate: &mut dyn FnMut(&mut Inventory) -> Result<(), InventoryError>,
    ) -> Result<Vec<Inventory>, InventoryError> {
        let mut ids = listing_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let rows = ids
            .iter()
            .map(|&id| self.row(id))
            .collect::<Result<Vec<_>, _>>()?;

        // Ascending order; every multi-row writer locks the same way.
        let mut guards = Vec::with_capacity(rows.len());
        for (&listing_id, row) in ids.iter().zip(&rows) {
            guards.push(self.lock_row(listing_id, row, wait)?);
        }

        let mut drafts = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut draft = row.state.read().clone();
            mutate(&mut draft)?;
            draft.last_updated = at;
            drafts.push(draft);
        }

        for (row, draft) in rows.iter().zip(&drafts) {
            *row.state.write() = draft.clone();
        }
        drop(guards);
        Ok(drafts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foodrescue_core::StoreId;

    fn listing(n: u64) -> ListingId {
        ListingId::new(n)
    }

    fn seeded(qty: u32) -> InMemoryInventoryStore {
        let store = InMemoryInventoryStore::new();
        store
            .register(Inventory::new(listing(1), StoreId::new(1), qty, Utc::now()))
            .unwrap();
        store
    }

    #[test]
    fn register_twice_is_rejected() {
        let store = seeded(3);
        let err = store
            .register(Inventory::new(listing(1), StoreId::new(1), 1, Utc::now()))
            .unwrap_err();
        assert_eq!(err, InventoryError::AlreadyRegistered(listing(1)));
    }

    #[test]
    fn failed_mutation_persists_nothing() {
        let store = seeded(3);
        let before = store.get(listing(1)).unwrap();

        let err = store
            .update(listing(1), Utc::now(), &mut |inv| {
                inv.qty_available = 0;
                Err(InventoryError::Overflow(inv.listing_id))
            })
            .unwrap_err();

        assert_eq!(err, InventoryError::Overflow(listing(1)));
        assert_eq!(store.get(listing(1)).unwrap(), before);
    }

    #[test]
    fn update_stamps_last_updated() {
        let store = seeded(3);
        let at = Utc::now() + chrono::Duration::minutes(5);
        let row = store
            .update(listing(1), at, &mut |inv| {
                inv.qty_available += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(row.last_updated, at);
        assert_eq!(row.qty_available, 4);
    }

    #[test]
    fn unknown_listing_is_not_found() {
        let store = seeded(3);
        assert_eq!(store.get(listing(9)).unwrap_err(), InventoryError::NotFound(listing(9)));
    }

    #[test]
    fn lock_wait_times_out_while_row_is_held() {
        let store = Arc::new(InMemoryInventoryStore::with_lock_timeout(Duration::from_millis(20)));
        store
            .register(Inventory::new(listing(1), StoreId::new(1), 5, Utc::now()))
            .unwrap();

        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let holder = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                store
                    .update(listing(1), Utc::now(), &mut |_inv| {
                        entered_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        Ok(())
                    })
                    .unwrap();
            })
        };

        entered_rx.recv().unwrap();
        let err = store
            .update(listing(1), Utc::now(), &mut |_inv| Ok(()))
            .unwrap_err();
        assert!(matches!(err, InventoryError::LockTimeout { .. }));
        assert!(err.is_retryable());

        // Snapshot reads are not blocked by the held row lock.
        assert_eq!(store.get(listing(1)).unwrap().qty_available, 5);

        release_tx.send(()).unwrap();
        holder.join().unwrap();
    }

    fn seeded_many(timeout: Duration, rows: &[(u64, u32)]) -> Arc<InMemoryInventoryStore> {
        let store = Arc::new(InMemoryInventoryStore::with_lock_timeout(timeout));
        for &(n, qty) in rows {
            store
                .register(Inventory::new(listing(n), StoreId::new(1), qty, Utc::now()))
                .unwrap();
        }
        store
    }

    /// Hold the row lock of `listing_id` on another thread until `release` fires.
    fn hold_row(
        store: &Arc<InMemoryInventoryStore>,
        listing_id: ListingId,
    ) -> (std::thread::JoinHandle<()>, std::sync::mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder = {
            let store = Arc::clone(store);
            std::thread::spawn(move || {
                store
                    .update(listing_id, Utc::now(), &mut |_inv| {
                        entered_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        Ok(())
                    })
                    .unwrap();
            })
        };
        entered_rx.recv().unwrap();
        (holder, release_tx)
    }

    #[test]
    fn update_many_writes_nothing_when_one_row_fails() {
        let store = seeded_many(InMemoryInventoryStore::DEFAULT_LOCK_TIMEOUT, &[(1, 5), (2, 1)]);

        let err = store
            .update_many(&[listing(2), listing(1)], Utc::now(), LockWait::Bounded, &mut |inv| {
                if inv.qty_available < 3 {
                    return Err(InventoryError::InsufficientStock {
                        listing_id: inv.listing_id,
                        requested: 3,
                        available: inv.qty_available,
                    });
                }
                inv.qty_available -= 3;
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, InventoryError::InsufficientStock { listing_id, .. } if listing_id == listing(2)));
        assert_eq!(store.get(listing(1)).unwrap().qty_available, 5);
        assert_eq!(store.get(listing(2)).unwrap().qty_available, 1);
    }

    #[test]
    fn update_many_returns_rows_in_listing_order() {
        let store = seeded_many(InMemoryInventoryStore::DEFAULT_LOCK_TIMEOUT, &[(1, 5), (2, 5)]);
        let rows = store
            .update_many(&[listing(2), listing(1), listing(2)], Utc::now(), LockWait::Bounded, &mut |inv| {
                inv.qty_available += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(rows.iter().map(|r| r.listing_id).collect::<Vec<_>>(), vec![listing(1), listing(2)]);
        assert!(rows.iter().all(|r| r.qty_available == 6));
    }

    #[test]
    fn bounded_update_many_times_out_without_touching_free_rows() {
        let store = seeded_many(Duration::from_millis(20), &[(1, 5), (2, 5)]);
        let (holder, release) = hold_row(&store, listing(2));

        let err = store
            .update_many(&[listing(1), listing(2)], Utc::now(), LockWait::Bounded, &mut |inv| {
                inv.qty_available += 3;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, InventoryError::LockTimeout { listing_id, .. } if listing_id == listing(2)));
        assert_eq!(store.get(listing(1)).unwrap().qty_available, 5);

        release.send(()).unwrap();
        holder.join().unwrap();
    }

    #[test]
    fn unbounded_update_many_outlasts_the_lock_timeout() {
        let store = seeded_many(Duration::from_millis(20), &[(1, 5), (2, 5)]);
        let (holder, release) = hold_row(&store, listing(2));

        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            release.send(()).unwrap();
        });
        let rows = store
            .update_many(&[listing(1), listing(2)], Utc::now(), LockWait::Unbounded, &mut |inv| {
                inv.qty_available += 3;
                Ok(())
            })
            .unwrap();
        assert!(rows.iter().all(|r| r.qty_available == 8));

        releaser.join().unwrap();
        holder.join().unwrap();
    }

    #[test]
    fn different_listings_do_not_contend() {
        let store = Arc::new(InMemoryInventoryStore::with_lock_timeout(Duration::from_millis(20)));
        for n in 1..=2 {
            store
                .register(Inventory::new(listing(n), StoreId::new(1), 5, Utc::now()))
                .unwrap();
        }

        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                store
                    .update(listing(1), Utc::now(), &mut |_inv| {
                        entered_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        Ok(())
                    })
                    .unwrap();
            })
        };

        entered_rx.recv().unwrap();
        let row = store
            .update(listing(2), Utc::now(), &mut |inv| {
                inv.qty_available -= 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(row.qty_available, 4);

        release_tx.send(()).unwrap();
        holder.join().unwrap();
    }
}
