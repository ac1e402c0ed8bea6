//! Request-scoped caller context.
//!
//! Every state-machine operation receives the identity of whoever asked for it.
//! Authorization is decided by the caller before invoking the operation; the
//! core only records who acted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::id::{ConsumerId, StoreId};

/// Who is performing an operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    /// A supplier acting on behalf of one store.
    Supplier { store_id: StoreId },
    /// A consumer acting on their own orders.
    Consumer { consumer_id: ConsumerId },
    /// Background or administrative work (no end-user identity).
    System,
}

impl core::fmt::Display for Actor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Actor::Supplier { store_id } => write!(f, "supplier:{store_id}"),
            Actor::Consumer { consumer_id } => write!(f, "consumer:{consumer_id}"),
            Actor::System => f.write_str("system"),
        }
    }
}

/// Immutable per-request context passed explicitly into every operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RequestContext {
    request_id: Uuid,
    actor: Actor,
}

impl RequestContext {
    pub fn new(actor: Actor) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            actor,
        }
    }

    pub fn with_request_id(request_id: Uuid, actor: Actor) -> Self {
        Self { request_id, actor }
    }

    pub fn system() -> Self {
        Self::new(Actor::System)
    }

    pub fn supplier(store_id: StoreId) -> Self {
        Self::new(Actor::Supplier { store_id })
    }

    pub fn consumer(consumer_id: ConsumerId) -> Self {
        Self::new(Actor::Consumer { consumer_id })
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn actor(&self) -> Actor {
        self.actor
    }

    /// Store the caller acts for, if the caller is a supplier.
    pub fn store_id(&self) -> Option<StoreId> {
        match self.actor {
            Actor::Supplier { store_id } => Some(store_id),
            _ => None,
        }
    }

    /// Consumer the caller is, if the caller is a consumer.
    pub fn consumer_id(&self) -> Option<ConsumerId> {
        match self.actor {
            Actor::Consumer { consumer_id } => Some(consumer_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_display_is_stable() {
        assert_eq!(Actor::Supplier { store_id: StoreId::new(3) }.to_string(), "supplier:3");
        assert_eq!(Actor::Consumer { consumer_id: ConsumerId::new(9) }.to_string(), "consumer:9");
        assert_eq!(Actor::System.to_string(), "system");
    }

    #[test]
    fn accessors_follow_actor_kind() {
        let ctx = RequestContext::supplier(StoreId::new(1));
        assert_eq!(ctx.store_id(), Some(StoreId::new(1)));
        assert_eq!(ctx.consumer_id(), None);
    }
}
