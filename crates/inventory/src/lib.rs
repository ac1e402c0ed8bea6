//! Inventory reservation: per-listing stock with an authoritative oversell guard.
//!
//! - `store`: where inventory rows live and how a row is locked for a
//!   read-modify-write.
//! - `reservation`: the decrement / restore / adjust operations built on it.

pub mod error;
pub mod inventory;
pub mod reservation;
pub mod store;

pub use error::InventoryError;
pub use inventory::Inventory;
pub use reservation::{ReservationEngine, ReservationLine};
pub use store::{InMemoryInventoryStore, InventoryStore, LockWait};
