//! Order lifecycle events, published after the change they describe is committed.
//!
//! The payment collaborator subscribes to these to capture or refund.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use foodrescue_core::{Actor, ConsumerId, OrderId, StoreId};
use foodrescue_events::Event;

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub store_id: StoreId,
    pub consumer_id: ConsumerId,
    pub total_amount: u64,
    pub currency: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderAccepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAccepted {
    pub order_id: OrderId,
    pub store_id: StoreId,
    pub actor: Actor,
    pub pickup_expires_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRejected {
    pub order_id: OrderId,
    pub store_id: StoreId,
    pub actor: Actor,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub store_id: StoreId,
    pub actor: Actor,
    pub reason: Option<String>,
    /// Stock held by the order was returned to inventory.
    pub stock_released: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCollected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCollected {
    pub order_id: OrderId,
    pub store_id: StoreId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    OrderAccepted(OrderAccepted),
    OrderRejected(OrderRejected),
    OrderCancelled(OrderCancelled),
    OrderCollected(OrderCollected),
}

impl OrderEvent {
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::OrderPlaced(e) => e.order_id,
            OrderEvent::OrderAccepted(e) => e.order_id,
            OrderEvent::OrderRejected(e) => e.order_id,
            OrderEvent::OrderCancelled(e) => e.order_id,
            OrderEvent::OrderCollected(e) => e.order_id,
        }
    }
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "order.placed",
            OrderEvent::OrderAccepted(_) => "order.accepted",
            OrderEvent::OrderRejected(_) => "order.rejected",
            OrderEvent::OrderCancelled(_) => "order.cancelled",
            OrderEvent::OrderCollected(_) => "order.collected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::OrderAccepted(e) => e.occurred_at,
            OrderEvent::OrderRejected(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
            OrderEvent::OrderCollected(e) => e.occurred_at,
        }
    }
}
