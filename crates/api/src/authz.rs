//! Ownership checks, applied before any operation is invoked.
//!
//! Suppliers act only on their own store; consumers only on their own orders.

use axum::http::StatusCode;
use axum::response::Response;

use foodrescue_core::{Actor, ConsumerId, RequestContext, StoreId};
use foodrescue_orders::Order;

use crate::app::errors;

fn forbidden(message: &str) -> Response {
    errors::json_error(StatusCode::FORBIDDEN, "forbidden", message)
}

/// The caller must be the supplier of `store_id`.
pub fn require_store(ctx: &RequestContext, store_id: StoreId) -> Result<(), Response> {
    match ctx.actor() {
        Actor::Supplier { store_id: own } if own == store_id => Ok(()),
        Actor::System => Ok(()),
        _ => Err(forbidden("caller does not act for this store")),
    }
}

/// The caller must be the consumer `consumer_id`.
pub fn require_consumer(ctx: &RequestContext, consumer_id: ConsumerId) -> Result<(), Response> {
    match ctx.actor() {
        Actor::Consumer { consumer_id: own } if own == consumer_id => Ok(()),
        Actor::System => Ok(()),
        _ => Err(forbidden("caller is not this consumer")),
    }
}

/// Any supplier, whichever store.
pub fn require_supplier(ctx: &RequestContext) -> Result<StoreId, Response> {
    ctx.store_id().ok_or_else(|| forbidden("only suppliers may do this"))
}

/// Either party to the order.
pub fn require_party(ctx: &RequestContext, order: &Order) -> Result<(), Response> {
    match ctx.actor() {
        Actor::Supplier { store_id } if store_id == order.store_id() => Ok(()),
        Actor::Consumer { consumer_id } if consumer_id == order.consumer_id() => Ok(()),
        Actor::System => Ok(()),
        _ => Err(forbidden("caller is not a party to this order")),
    }
}
