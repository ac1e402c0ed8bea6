//! Order state machine orchestration.
//!
//! Every transition follows the same pipeline:
//!
//! ```text
//! load order (capture version)
//!   ↓
//! pure transition rule (refuse with OrderState, no side effect)
//!   ↓
//! commit section on the order row:
//!     version check → side effects (stock / token) → write
//!   ↓
//! publish lifecycle event (failures logged, never fatal)
//! ```
//!
//! Lock order is order row, then inventory rows in ascending listing id, then
//! the token store. Nothing takes an order row while holding the others.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use foodrescue_core::{
    ConsumerId, ExpectedVersion, ListingId, OrderId, RequestContext, StoreId,
};
use foodrescue_events::{EventBus, EventEnvelope, InMemoryEventBus};
use foodrescue_inventory::{
    InMemoryInventoryStore, Inventory, InventoryStore, ReservationEngine, ReservationLine,
};
use foodrescue_orders::{
    InMemoryOrderRepository, LineDraft, Order, OrderAccepted, OrderCancelled, OrderCollected,
    OrderDraft, OrderEvent, OrderFilter, OrderPlaced, OrderRejected, OrderRepository, OrderStatus,
    PickupSlot, normalize_reason,
};
use foodrescue_pickup::{InMemoryPickupTokenStore, PickupToken, PickupTokenStore};

use crate::config::ServiceConfig;
use crate::error::ServiceError;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Envelope type carried on the order event bus.
pub type OrderEnvelope = EventEnvelope<OrderEvent>;

const AGGREGATE_TYPE: &str = "order";

/// Command: place a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrder {
    pub store_id: StoreId,
    pub consumer_id: ConsumerId,
    pub lines: Vec<LineDraft>,
    /// Falls back to the configured default currency.
    pub currency: Option<String>,
    pub pickup_slot: Option<PickupSlot>,
}

/// Fully in-memory wiring, used by the HTTP binary and tests.
pub type InMemoryOrderService = OrderService<
    InMemoryInventoryStore,
    InMemoryOrderRepository,
    InMemoryPickupTokenStore,
    InMemoryEventBus<OrderEnvelope>,
>;

#[derive(Debug)]
pub struct OrderService<I, R, T, B> {
    inventory: ReservationEngine<I>,
    orders: R,
    tokens: T,
    bus: B,
    default_currency: String,
}

impl<I, R, T, B> OrderService<I, R, T, B> {
    pub fn new(inventory: ReservationEngine<I>, orders: R, tokens: T, bus: B, default_currency: impl Into<String>) -> Self {
        Self {
            inventory,
            orders,
            tokens,
            bus,
            default_currency: default_currency.into(),
        }
    }

    pub fn inventory(&self) -> &ReservationEngine<I> {
        &self.inventory
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl InMemoryOrderService {
    pub fn in_memory(config: &ServiceConfig) -> Self {
        Self::new(
            ReservationEngine::new(InMemoryInventoryStore::with_lock_timeout(config.lock_timeout)),
            InMemoryOrderRepository::with_lock_timeout(config.lock_timeout),
            InMemoryPickupTokenStore::with_validity(config.token_validity_chrono()),
            InMemoryEventBus::new(),
            config.default_currency.clone(),
        )
    }
}

impl<I, R, T, B> OrderService<I, R, T, B>
where
    I: InventoryStore,
    R: OrderRepository,
    T: PickupTokenStore,
    B: EventBus<OrderEnvelope>,
{
    /// Place a PENDING order.
    ///
    /// Stock is only checked, not taken: the check is advisory and the
    /// authoritative decrement happens at acceptance.
    #[tracing::instrument(
        skip(self, ctx, cmd, at),
        fields(actor = %ctx.actor(), request_id = %ctx.request_id(), store_id = %cmd.store_id)
    )]
    pub fn create_order(&self, ctx: &RequestContext, cmd: PlaceOrder, at: DateTime<Utc>) -> ServiceResult<Order> {
        let mut wanted: BTreeMap<ListingId, u32> = BTreeMap::new();
        for line in &cmd.lines {
            let total = wanted.entry(line.listing_id).or_insert(0);
            *total = total
                .checked_add(line.quantity)
                .ok_or_else(|| ServiceError::Validation(format!("quantity overflow on listing {}", line.listing_id)))?;
        }

        for (&listing_id, &quantity) in &wanted {
            let inventory = self.inventory.get(listing_id)?;
            if inventory.store_id != cmd.store_id {
                return Err(ServiceError::Validation(format!(
                    "listing {listing_id} belongs to store {}, not store {}",
                    inventory.store_id, cmd.store_id
                )));
            }
            if !inventory.has_available(quantity) {
                tracing::info!(%listing_id, requested = quantity, available = inventory.qty_available, "order refused by stock pre-check");
                return Err(ServiceError::InsufficientStock {
                    listing_id,
                    requested: quantity,
                    available: inventory.qty_available,
                });
            }
        }

        let draft = OrderDraft {
            store_id: cmd.store_id,
            consumer_id: cmd.consumer_id,
            lines: cmd.lines,
            currency: cmd.currency.unwrap_or_else(|| self.default_currency.clone()),
            pickup_slot: cmd.pickup_slot,
        };
        let order = Order::place(self.orders.next_id(), draft, at)?;
        let order = self.orders.insert(order)?;

        tracing::info!(order_id = %order.order_id(), total = order.total_amount(), "order placed");
        self.publish(
            &order,
            OrderEvent::OrderPlaced(OrderPlaced {
                order_id: order.order_id(),
                store_id: order.store_id(),
                consumer_id: order.consumer_id(),
                total_amount: order.total_amount(),
                currency: order.currency().to_string(),
                actor: ctx.actor(),
                occurred_at: at,
            }),
        );
        Ok(order)
    }

    /// PENDING → ACCEPTED: take stock for every line, then issue the pickup token.
    #[tracing::instrument(
        skip(self, ctx, at),
        fields(actor = %ctx.actor(), request_id = %ctx.request_id())
    )]
    pub fn accept_order(&self, ctx: &RequestContext, order_id: OrderId, at: DateTime<Utc>) -> ServiceResult<Order> {
        let current = self.orders.get(order_id)?;
        let next = current.accept(at)?;
        let lines = reservation_lines(&current);

        let mut issued: Option<PickupToken> = None;
        let committed = self
            .orders
            .commit_with(next, ExpectedVersion::of(&current), || -> ServiceResult<()> {
                self.inventory.reserve_all(&lines, at)?;
                match self.tokens.issue(order_id, at) {
                    Ok(token) => {
                        issued = Some(token);
                        Ok(())
                    }
                    Err(err) => {
                        tracing::error!(%order_id, error = %err, "token issue failed after reserving stock; releasing");
                        if let Err(release) = self.inventory.compensate(&lines, at) {
                            return Err(ServiceError::CompensationFailed {
                                order_id,
                                unreleased: lines.clone(),
                                reason: format!("{release} (after token issue failed: {err})"),
                            });
                        }
                        Err(err.into())
                    }
                }
            })
            .inspect_err(|err| tracing::info!(%order_id, error = %err, "accept refused"))?;

        let expires_at = issued.map(|t| t.expires_at).unwrap_or(at);
        tracing::info!(%order_id, version = committed_version(&committed), "order accepted");
        self.publish(
            &committed,
            OrderEvent::OrderAccepted(OrderAccepted {
                order_id,
                store_id: committed.store_id(),
                actor: ctx.actor(),
                pickup_expires_at: expires_at,
                occurred_at: at,
            }),
        );
        Ok(committed)
    }

    /// PENDING → REJECTED. No stock effect.
    #[tracing::instrument(
        skip(self, ctx, reason, at),
        fields(actor = %ctx.actor(), request_id = %ctx.request_id())
    )]
    pub fn reject_order(
        &self,
        ctx: &RequestContext,
        order_id: OrderId,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> ServiceResult<Order> {
        let reason = normalize_reason(reason)?;
        let current = self.orders.get(order_id)?;
        let next = current.reject(reason.clone(), at)?;

        let committed = self
            .orders
            .commit_with(next, ExpectedVersion::of(&current), || Ok::<(), ServiceError>(()))?;

        tracing::info!(%order_id, "order rejected");
        self.publish(
            &committed,
            OrderEvent::OrderRejected(OrderRejected {
                order_id,
                store_id: committed.store_id(),
                actor: ctx.actor(),
                reason,
                occurred_at: at,
            }),
        );
        Ok(committed)
    }

    /// {PENDING, ACCEPTED} → CANCELLED. Stock held by an accepted order goes back.
    #[tracing::instrument(
        skip(self, ctx, reason, at),
        fields(actor = %ctx.actor(), request_id = %ctx.request_id())
    )]
    pub fn cancel_order(
        &self,
        ctx: &RequestContext,
        order_id: OrderId,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> ServiceResult<Order> {
        let reason = normalize_reason(reason)?;
        let current = self.orders.get(order_id)?;
        let cancellation = current.cancel(reason.clone(), at)?;
        let releases_stock = cancellation.releases_stock;
        let lines = reservation_lines(&current);

        let committed = self
            .orders
            .commit_with(cancellation.order, ExpectedVersion::of(&current), || -> ServiceResult<()> {
                if releases_stock {
                    self.inventory.release_all(&lines, at)?;
                }
                Ok(())
            })?;

        tracing::info!(%order_id, releases_stock, "order cancelled");
        self.publish(
            &committed,
            OrderEvent::OrderCancelled(OrderCancelled {
                order_id,
                store_id: committed.store_id(),
                actor: ctx.actor(),
                reason,
                stock_released: releases_stock,
                occurred_at: at,
            }),
        );
        Ok(committed)
    }

    /// ACCEPTED → COLLECTED on presentation of a valid pickup token.
    ///
    /// A supplier can only redeem tokens for its own store; any other token
    /// is reported as invalid.
    #[tracing::instrument(
        skip(self, ctx, token_hash, at),
        fields(actor = %ctx.actor(), request_id = %ctx.request_id())
    )]
    pub fn validate_pickup(&self, ctx: &RequestContext, token_hash: &str, at: DateTime<Utc>) -> ServiceResult<Order> {
        let order_id = self.tokens.validate(token_hash, at)?;
        let current = self.orders.get(order_id)?;
        if let Some(store_id) = ctx.store_id() {
            if store_id != current.store_id() {
                tracing::warn!(%order_id, %store_id, "pickup token presented at another store");
                return Err(ServiceError::TokenInvalid);
            }
        }
        let next = current.collect(at)?;

        let committed = self
            .orders
            .commit_with(next, ExpectedVersion::of(&current), || -> ServiceResult<()> {
                self.tokens.consume(order_id, token_hash, at)?;
                Ok(())
            })?;

        tracing::info!(%order_id, "order collected");
        self.publish(
            &committed,
            OrderEvent::OrderCollected(OrderCollected {
                order_id,
                store_id: committed.store_id(),
                actor: ctx.actor(),
                occurred_at: at,
            }),
        );
        Ok(committed)
    }

    /// Create the inventory row for a new listing.
    #[tracing::instrument(
        skip(self, ctx, at),
        fields(actor = %ctx.actor(), request_id = %ctx.request_id())
    )]
    pub fn register_inventory(
        &self,
        ctx: &RequestContext,
        listing_id: ListingId,
        store_id: StoreId,
        qty_available: u32,
        at: DateTime<Utc>,
    ) -> ServiceResult<Inventory> {
        Ok(self.inventory.register(listing_id, store_id, qty_available, at)?)
    }

    /// Supplier restock or write-off.
    #[tracing::instrument(
        skip(self, ctx, at),
        fields(actor = %ctx.actor(), request_id = %ctx.request_id())
    )]
    pub fn adjust_inventory(
        &self,
        ctx: &RequestContext,
        listing_id: ListingId,
        delta: i64,
        at: DateTime<Utc>,
    ) -> ServiceResult<Inventory> {
        Ok(self.inventory.adjust(listing_id, delta, at)?)
    }

    pub fn get_inventory(&self, listing_id: ListingId) -> ServiceResult<Inventory> {
        Ok(self.inventory.get(listing_id)?)
    }

    /// Every inventory row a store owns, in listing order.
    pub fn inventory_for_store(&self, store_id: StoreId) -> Vec<Inventory> {
        self.inventory.list_for_store(store_id)
    }

    pub fn get_order(&self, order_id: OrderId) -> ServiceResult<Order> {
        Ok(self.orders.get(order_id)?)
    }

    /// Supplier order queue, newest first.
    pub fn orders_for_store(&self, store_id: StoreId, status: Option<OrderStatus>) -> Vec<Order> {
        self.orders
            .list(&OrderFilter::all().for_store(store_id).with_status(status))
    }

    /// Consumer order history, newest first.
    pub fn orders_for_consumer(&self, consumer_id: ConsumerId, status: Option<OrderStatus>) -> Vec<Order> {
        self.orders
            .list(&OrderFilter::all().for_consumer(consumer_id).with_status(status))
    }

    pub fn count_pending_for_store(&self, store_id: StoreId) -> usize {
        self.orders_for_store(store_id, Some(OrderStatus::Pending)).len()
    }

    /// The token the QR renderer encodes for an accepted order.
    pub fn pickup_token_for(&self, order_id: OrderId) -> ServiceResult<PickupToken> {
        self.orders.get(order_id)?;
        self.tokens
            .get(order_id)
            .ok_or_else(|| ServiceError::NotFound(format!("pickup token for order {order_id}")))
    }

    fn publish(&self, order: &Order, event: OrderEvent) {
        let event_type = foodrescue_events::Event::event_type(&event);
        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            order.order_id().get(),
            AGGREGATE_TYPE,
            committed_version(order),
            event,
        );
        if let Err(err) = self.bus.publish(envelope) {
            tracing::warn!(order_id = %order.order_id(), event_type, error = ?err, "event publication failed after commit");
        }
    }
}

fn reservation_lines(order: &Order) -> Vec<ReservationLine> {
    order
        .quantities()
        .map(|(listing_id, quantity)| ReservationLine::new(listing_id, quantity))
        .collect()
}

fn committed_version(order: &Order) -> u64 {
    foodrescue_core::AggregateRoot::version(order)
}
