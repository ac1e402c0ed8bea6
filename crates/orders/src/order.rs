use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use foodrescue_core::{AggregateRoot, ConsumerId, DomainError, ListingId, OrderId, StoreId};

/// Longest cancel/reject reason accepted.
pub const MAX_REASON_LEN: usize = 300;

/// Order status lifecycle.
///
/// ```text
/// PENDING ──accept──▶ ACCEPTED ──collect──▶ COLLECTED
///    │                   │
///    ├──reject──▶ REJECTED
///    └──cancel──▶ CANCELLED ◀──cancel──┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
    Collected,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Collected => "COLLECTED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Rejected | OrderStatus::Cancelled | OrderStatus::Collected
        )
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(OrderStatus::Pending),
            "ACCEPTED" => Ok(OrderStatus::Accepted),
            "REJECTED" => Ok(OrderStatus::Rejected),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            "COLLECTED" => Ok(OrderStatus::Collected),
            other => Err(DomainError::validation(format!("unknown order status '{other}'"))),
        }
    }
}

/// An action was attempted on an order that is not in a state allowing it.
///
/// Not retryable: the caller must reload and reconsider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("order {order_id} is in state {current} but must be {} for this action", join_statuses(.required))]
pub struct OrderStateError {
    pub order_id: OrderId,
    pub current: OrderStatus,
    pub required: &'static [OrderStatus],
}

fn join_statuses(statuses: &[OrderStatus]) -> String {
    statuses
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Pickup window agreed at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PickupSlot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, DomainError> {
        if start >= end {
            return Err(DomainError::validation("pickup slot start must be before its end"));
        }
        Ok(Self { start, end })
    }
}

/// Order line: listing, quantity, unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub listing_id: ListingId,
    pub quantity: u32,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
    pub line_total: u64,
}

/// Line as supplied by checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDraft {
    pub listing_id: ListingId,
    pub quantity: u32,
    pub unit_price: u64,
}

/// Everything needed to place an order, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub store_id: StoreId,
    pub consumer_id: ConsumerId,
    pub lines: Vec<LineDraft>,
    pub currency: String,
    pub pickup_slot: Option<PickupSlot>,
}

/// Outcome of a successful cancel, for the caller to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancellation {
    pub order: Order,
    /// Stock was held by this order and must be given back.
    pub releases_stock: bool,
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    store_id: StoreId,
    consumer_id: ConsumerId,
    items: Vec<OrderItem>,
    status: OrderStatus,
    total_amount: u64,
    currency: String,
    cancel_reason: Option<String>,
    pickup_slot: Option<PickupSlot>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Build a new PENDING order at version 1.
    pub fn place(id: OrderId, draft: OrderDraft, at: DateTime<Utc>) -> Result<Self, DomainError> {
        if draft.lines.is_empty() {
            return Err(DomainError::validation("order must contain at least one item"));
        }
        let currency = draft.currency.trim().to_ascii_uppercase();
        if currency.is_empty() {
            return Err(DomainError::validation("currency cannot be empty"));
        }

        let mut items = Vec::with_capacity(draft.lines.len());
        let mut total: u64 = 0;
        for line in &draft.lines {
            if line.quantity == 0 {
                return Err(DomainError::validation(format!(
                    "quantity for listing {} must be positive",
                    line.listing_id
                )));
            }
            let line_total = line
                .unit_price
                .checked_mul(u64::from(line.quantity))
                .ok_or_else(|| DomainError::validation("line total overflows"))?;
            total = total
                .checked_add(line_total)
                .ok_or_else(|| DomainError::validation("order total overflows"))?;
            items.push(OrderItem {
                listing_id: line.listing_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                line_total,
            });
        }

        Ok(Self {
            id,
            store_id: draft.store_id,
            consumer_id: draft.consumer_id,
            items,
            status: OrderStatus::Pending,
            total_amount: total,
            currency,
            cancel_reason: None,
            pickup_slot: draft.pickup_slot,
            version: 1,
            created_at: at,
            updated_at: at,
        })
    }

    pub fn order_id(&self) -> OrderId {
        self.id
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn consumer_id(&self) -> ConsumerId {
        self.consumer_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn total_amount(&self) -> u64 {
        self.total_amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn pickup_slot(&self) -> Option<PickupSlot> {
        self.pickup_slot
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// `(listing, quantity)` for every line, in line order.
    pub fn quantities(&self) -> impl Iterator<Item = (ListingId, u32)> + '_ {
        self.items.iter().map(|i| (i.listing_id, i.quantity))
    }

    /// Stamped by the repository when a mutation is committed.
    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

// Transition rules. Each returns the next state without touching `self`.
impl Order {
    const ACCEPT_FROM: &'static [OrderStatus] = &[OrderStatus::Pending];
    const REJECT_FROM: &'static [OrderStatus] = &[OrderStatus::Pending];
    const CANCEL_FROM: &'static [OrderStatus] = &[OrderStatus::Pending, OrderStatus::Accepted];
    const COLLECT_FROM: &'static [OrderStatus] = &[OrderStatus::Accepted];

    fn ensure_status(&self, allowed: &'static [OrderStatus]) -> Result<(), OrderStateError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(OrderStateError {
                order_id: self.id,
                current: self.status,
                required: allowed,
            })
        }
    }

    fn moved_to(&self, status: OrderStatus, at: DateTime<Utc>) -> Order {
        let mut next = self.clone();
        next.status = status;
        next.updated_at = at;
        next
    }

    pub fn accept(&self, at: DateTime<Utc>) -> Result<Order, OrderStateError> {
        self.ensure_status(Self::ACCEPT_FROM)?;
        Ok(self.moved_to(OrderStatus::Accepted, at))
    }

    pub fn reject(&self, reason: Option<String>, at: DateTime<Utc>) -> Result<Order, OrderStateError> {
        self.ensure_status(Self::REJECT_FROM)?;
        let mut next = self.moved_to(OrderStatus::Rejected, at);
        next.cancel_reason = reason;
        Ok(next)
    }

    pub fn cancel(&self, reason: Option<String>, at: DateTime<Utc>) -> Result<Cancellation, OrderStateError> {
        self.ensure_status(Self::CANCEL_FROM)?;
        let mut next = self.moved_to(OrderStatus::Cancelled, at);
        next.cancel_reason = reason;
        Ok(Cancellation {
            order: next,
            releases_stock: self.status == OrderStatus::Accepted,
        })
    }

    pub fn collect(&self, at: DateTime<Utc>) -> Result<Order, OrderStateError> {
        self.ensure_status(Self::COLLECT_FROM)?;
        Ok(self.moved_to(OrderStatus::Collected, at))
    }
}

/// Normalize a free-text reason: blank becomes `None`, overlong is refused.
pub fn normalize_reason(reason: Option<String>) -> Result<Option<String>, DomainError> {
    let Some(reason) = reason else {
        return Ok(None);
    };
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_REASON_LEN {
        return Err(DomainError::validation(format!(
            "reason cannot exceed {MAX_REASON_LEN} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn draft(lines: Vec<LineDraft>) -> OrderDraft {
        OrderDraft {
            store_id: StoreId::new(1),
            consumer_id: ConsumerId::new(2),
            lines,
            currency: "sgd".to_string(),
            pickup_slot: None,
        }
    }

    fn line(listing: u64, quantity: u32, unit_price: u64) -> LineDraft {
        LineDraft {
            listing_id: ListingId::new(listing),
            quantity,
            unit_price,
        }
    }

    fn pending_order() -> Order {
        Order::place(OrderId::new(10), draft(vec![line(1, 2, 350)]), test_time()).unwrap()
    }

    #[test]
    fn place_computes_totals_and_starts_pending() {
        let order = Order::place(
            OrderId::new(1),
            draft(vec![line(1, 2, 350), line(2, 1, 500)]),
            test_time(),
        )
        .unwrap();

        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.version(), 1);
        assert_eq!(order.items()[0].line_total, 700);
        assert_eq!(order.total_amount(), 1200);
        assert_eq!(order.currency(), "SGD");
    }

    #[test]
    fn place_rejects_empty_and_zero_quantity() {
        let err = Order::place(OrderId::new(1), draft(vec![]), test_time()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("at least one item")));

        let err = Order::place(OrderId::new(1), draft(vec![line(1, 0, 100)]), test_time()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("must be positive")));
    }

    #[test]
    fn place_rejects_overflowing_totals() {
        let err = Order::place(OrderId::new(1), draft(vec![line(1, 2, u64::MAX)]), test_time()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn pickup_slot_must_be_ordered() {
        let now = test_time();
        assert!(PickupSlot::new(now, now + chrono::Duration::hours(1)).is_ok());
        assert!(PickupSlot::new(now, now).is_err());
    }

    #[test]
    fn accept_moves_pending_to_accepted_without_mutating() {
        let order = pending_order();
        let accepted = order.accept(test_time()).unwrap();

        assert_eq!(accepted.status(), OrderStatus::Accepted);
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(accepted.version(), order.version());
    }

    #[test]
    fn reject_records_reason() {
        let rejected = pending_order()
            .reject(Some("sold out at the counter".into()), test_time())
            .unwrap();
        assert_eq!(rejected.status(), OrderStatus::Rejected);
        assert_eq!(rejected.cancel_reason(), Some("sold out at the counter"));
    }

    #[test]
    fn cancel_releases_stock_only_when_accepted() {
        let order = pending_order();
        let from_pending = order.cancel(None, test_time()).unwrap();
        assert!(!from_pending.releases_stock);

        let accepted = order.accept(test_time()).unwrap();
        let from_accepted = accepted.cancel(Some("changed my mind".into()), test_time()).unwrap();
        assert!(from_accepted.releases_stock);
        assert_eq!(from_accepted.order.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn collect_requires_accepted() {
        let order = pending_order();
        let err = order.collect(test_time()).unwrap_err();
        assert_eq!(err.current, OrderStatus::Pending);
        assert_eq!(err.required, &[OrderStatus::Accepted]);

        let collected = order.accept(test_time()).unwrap().collect(test_time()).unwrap();
        assert_eq!(collected.status(), OrderStatus::Collected);
    }

    #[test]
    fn terminal_states_refuse_everything() {
        let now = test_time();
        let rejected = pending_order().reject(None, now).unwrap();
        let cancelled = pending_order().cancel(None, now).unwrap().order;
        let collected = pending_order().accept(now).unwrap().collect(now).unwrap();

        for order in [rejected, cancelled, collected] {
            assert!(order.status().is_terminal());
            assert!(order.accept(now).is_err());
            assert!(order.reject(None, now).is_err());
            assert!(order.cancel(None, now).is_err());
            assert!(order.collect(now).is_err());
        }
    }

    #[test]
    fn state_error_names_required_states() {
        let collected = pending_order()
            .accept(test_time())
            .unwrap()
            .collect(test_time())
            .unwrap();
        let err = collected.cancel(None, test_time()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "order 10 is in state COLLECTED but must be PENDING or ACCEPTED for this action"
        );
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("accepted".parse::<OrderStatus>().unwrap(), OrderStatus::Accepted);
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn reasons_are_trimmed_and_bounded() {
        assert_eq!(normalize_reason(Some("  ".into())).unwrap(), None);
        assert_eq!(normalize_reason(Some(" late ".into())).unwrap(), Some("late".to_string()));
        assert!(normalize_reason(Some("x".repeat(MAX_REASON_LEN + 1))).is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 128,
                ..ProptestConfig::default()
            })]

            /// Total equals the sum of line totals for any non-overflowing draft.
            #[test]
            fn total_is_sum_of_lines(
                lines in proptest::collection::vec((1u64..50, 1u32..20, 0u64..10_000), 1..10)
            ) {
                let drafts: Vec<LineDraft> = lines
                    .iter()
                    .map(|(listing, qty, price)| line(*listing, *qty, *price))
                    .collect();
                let order = Order::place(OrderId::new(1), draft(drafts), test_time()).unwrap();
                let expected: u64 = lines.iter().map(|(_, q, p)| u64::from(*q) * p).sum();
                prop_assert_eq!(order.total_amount(), expected);
            }

            /// Once terminal, an order stays where it is whatever is attempted next.
            #[test]
            fn terminal_states_are_absorbing(actions in proptest::collection::vec(0u8..4, 1..12)) {
                let now = test_time();
                let mut order = pending_order();
                for action in actions {
                    let before = order.status();
                    let next = match action {
                        0 => order.accept(now).ok(),
                        1 => order.reject(None, now).ok(),
                        2 => order.cancel(None, now).ok().map(|c| c.order),
                        _ => order.collect(now).ok(),
                    };
                    if before.is_terminal() {
                        prop_assert!(next.is_none());
                    }
                    if let Some(next) = next {
                        order = next;
                    }
                }
            }
        }
    }
}
