use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use foodrescue_core::{ConsumerId, ListingId, OrderId, StoreId};
use foodrescue_inventory::Inventory;
use foodrescue_orders::{LineDraft, Order, OrderItem, OrderStatus, PickupSlot};
use foodrescue_pickup::PickupToken;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct OrderLineRequest {
    pub listing_id: ListingId,
    pub quantity: u32,
    pub unit_price: u64,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub store_id: StoreId,
    pub items: Vec<OrderLineRequest>,
    pub currency: Option<String>,
    pub pickup_slot_start: Option<DateTime<Utc>>,
    pub pickup_slot_end: Option<DateTime<Utc>>,
}

impl CreateOrderRequest {
    pub fn lines(&self) -> Vec<LineDraft> {
        self.items
            .iter()
            .map(|i| LineDraft {
                listing_id: i.listing_id,
                quantity: i.quantity,
                unit_price: i.unit_price,
            })
            .collect()
    }

    /// Both ends or neither.
    pub fn pickup_slot(&self) -> Result<Option<PickupSlot>, String> {
        match (self.pickup_slot_start, self.pickup_slot_end) {
            (None, None) => Ok(None),
            (Some(start), Some(end)) => PickupSlot::new(start, end).map(Some).map_err(|e| e.to_string()),
            _ => Err("pickup_slot_start and pickup_slot_end must be given together".to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ValidatePickupRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterInventoryRequest {
    pub listing_id: ListingId,
    pub qty_available: u32,
}

#[derive(Debug, Deserialize)]
pub struct AdjustInventoryRequest {
    pub delta: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

impl StatusQuery {
    pub fn status(&self) -> Result<Option<OrderStatus>, String> {
        self.status
            .as_deref()
            .map(|s| s.parse::<OrderStatus>().map_err(|e| e.to_string()))
            .transpose()
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub store_id: StoreId,
    pub consumer_id: ConsumerId,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub total_amount: u64,
    pub currency: String,
    pub cancel_reason: Option<String>,
    pub pickup_slot_start: Option<DateTime<Utc>>,
    pub pickup_slot_end: Option<DateTime<Utc>>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        let slot = order.pickup_slot();
        Self {
            id: order.order_id(),
            store_id: order.store_id(),
            consumer_id: order.consumer_id(),
            status: order.status(),
            items: order.items().to_vec(),
            total_amount: order.total_amount(),
            currency: order.currency().to_string(),
            cancel_reason: order.cancel_reason().map(str::to_string),
            pickup_slot_start: slot.map(|s| s.start),
            pickup_slot_end: slot.map(|s| s.end),
            version: foodrescue_core::AggregateRoot::version(order),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub count: usize,
}

impl OrderListResponse {
    pub fn new(orders: &[Order]) -> Self {
        Self {
            orders: orders.iter().map(OrderResponse::from).collect(),
            count: orders.len(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InventoryResponse {
    pub listing_id: ListingId,
    pub store_id: StoreId,
    pub qty_available: u32,
    pub qty_reserved: u32,
    pub last_updated: DateTime<Utc>,
}

impl From<Inventory> for InventoryResponse {
    fn from(inv: Inventory) -> Self {
        Self {
            listing_id: inv.listing_id,
            store_id: inv.store_id,
            qty_available: inv.qty_available,
            qty_reserved: inv.qty_reserved,
            last_updated: inv.last_updated,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InventoryListResponse {
    pub items: Vec<InventoryResponse>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct PickupTokenResponse {
    pub order_id: OrderId,
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

impl From<PickupToken> for PickupTokenResponse {
    fn from(token: PickupToken) -> Self {
        Self {
            used: token.is_used(),
            order_id: token.order_id,
            token: token.qr_token_hash,
            issued_at: token.issued_at,
            expires_at: token.expires_at,
        }
    }
}
