//! Customer orders: the aggregate, its transition rules and its repository.
//!
//! Transition rules are pure: they compute the next state of an order or
//! refuse with an [`OrderStateError`]. Stock and token side effects are wired in
//! by the caller through [`OrderRepository::commit_with`].

pub mod events;
pub mod order;
pub mod repository;

pub use events::{
    OrderAccepted, OrderCancelled, OrderCollected, OrderEvent, OrderPlaced, OrderRejected,
};
pub use order::{
    Cancellation, LineDraft, MAX_REASON_LEN, Order, OrderDraft, OrderItem, OrderStateError,
    OrderStatus, PickupSlot, normalize_reason,
};
pub use repository::{
    CommitError, InMemoryOrderRepository, OrderFilter, OrderRepository, RepositoryError,
};
