use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use foodrescue_core::{ListingId, StoreId};

/// Stock for one listing.
///
/// `qty_available` is the only figure that gates reservations. `qty_reserved`
/// tracks units currently held by accepted orders and is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub listing_id: ListingId,
    pub store_id: StoreId,
    pub qty_available: u32,
    pub qty_reserved: u32,
    pub last_updated: DateTime<Utc>,
}

impl Inventory {
    pub fn new(listing_id: ListingId, store_id: StoreId, qty_available: u32, at: DateTime<Utc>) -> Self {
        Self {
            listing_id,
            store_id,
            qty_available,
            qty_reserved: 0,
            last_updated: at,
        }
    }

    pub fn has_available(&self, qty: u32) -> bool {
        self.qty_available >= qty
    }
}
