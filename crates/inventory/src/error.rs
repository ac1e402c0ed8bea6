use thiserror::Error;

use foodrescue_core::ListingId;

/// Inventory operation failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Not enough units left under the lock. A business fact, not transient.
    #[error("insufficient stock for listing {listing_id}: requested {requested}, available {available}")]
    InsufficientStock {
        listing_id: ListingId,
        requested: u32,
        available: u32,
    },

    /// A supplier adjustment that would leave the row invalid.
    #[error("invalid adjustment for listing {listing_id}: delta {delta} against {available} available")]
    InvalidAdjustment {
        listing_id: ListingId,
        delta: i64,
        available: u32,
    },

    #[error("no inventory for listing {0}")]
    NotFound(ListingId),

    #[error("inventory for listing {0} already registered")]
    AlreadyRegistered(ListingId),

    /// The row lock could not be acquired in time. Safe to retry.
    #[error("timed out after {waited_ms}ms waiting for the inventory lock on listing {listing_id}")]
    LockTimeout { listing_id: ListingId, waited_ms: u64 },

    #[error("quantity overflow on listing {0}")]
    Overflow(ListingId),
}

impl InventoryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, InventoryError::LockTimeout { .. })
    }
}
