//! One error type for every order-service operation.
//!
//! Per-crate errors are folded in through `From`, so operations can use `?`
//! on inventory, repository, token and domain failures alike.

use thiserror::Error;

use foodrescue_core::{DomainError, ListingId, OrderId};
use foodrescue_inventory::{InventoryError, ReservationLine};
use foodrescue_orders::{CommitError, OrderStateError, RepositoryError};
use foodrescue_pickup::TokenError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("insufficient stock for listing {listing_id}: requested {requested}, available {available}")]
    InsufficientStock {
        listing_id: ListingId,
        requested: u32,
        available: u32,
    },

    #[error(transparent)]
    OrderState(#[from] OrderStateError),

    /// The order changed since it was read. Reload and retry.
    #[error("order {order_id} was modified concurrently")]
    ConcurrentModification { order_id: OrderId },

    #[error("invalid adjustment for listing {listing_id}: delta {delta} against {available} available")]
    InvalidAdjustment {
        listing_id: ListingId,
        delta: i64,
        available: u32,
    },

    /// Unknown, used and expired tokens all look the same from outside.
    #[error("pickup token is invalid")]
    TokenInvalid,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A row lock could not be taken in time. Retry later.
    #[error("lock timeout: {0}")]
    LockTimeout(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// Stock taken by a failed transition could not be given back. The listed
    /// units are missing from inventory until corrected by hand.
    #[error("order {order_id}: stock for {} listing(s) could not be returned: {reason}", .unreleased.len())]
    CompensationFailed {
        order_id: OrderId,
        unreleased: Vec<ReservationLine>,
        reason: String,
    },
}

impl ServiceError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::ConcurrentModification { .. } | ServiceError::LockTimeout(_)
        )
    }
}

impl From<InventoryError> for ServiceError {
    fn from(value: InventoryError) -> Self {
        match value {
            InventoryError::InsufficientStock {
                listing_id,
                requested,
                available,
            } => ServiceError::InsufficientStock {
                listing_id,
                requested,
                available,
            },
            InventoryError::InvalidAdjustment {
                listing_id,
                delta,
                available,
            } => ServiceError::InvalidAdjustment {
                listing_id,
                delta,
                available,
            },
            InventoryError::NotFound(listing_id) => {
                ServiceError::NotFound(format!("inventory for listing {listing_id}"))
            }
            InventoryError::AlreadyRegistered(_) => ServiceError::Conflict(value.to_string()),
            InventoryError::LockTimeout { .. } => ServiceError::LockTimeout(value.to_string()),
            InventoryError::Overflow(_) => ServiceError::Validation(value.to_string()),
        }
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound(order_id) => ServiceError::NotFound(format!("order {order_id}")),
            RepositoryError::ConcurrentModification { order_id, .. } => {
                ServiceError::ConcurrentModification { order_id }
            }
            RepositoryError::LockTimeout { .. } => ServiceError::LockTimeout(value.to_string()),
            RepositoryError::AlreadyExists(_) => ServiceError::Internal(value.to_string()),
        }
    }
}

impl From<TokenError> for ServiceError {
    fn from(value: TokenError) -> Self {
        match value {
            TokenError::Rejected(_) => ServiceError::TokenInvalid,
            // One token per order is guaranteed by the accept commit; reaching this is a bug.
            TokenError::AlreadyIssued(_) => ServiceError::Internal(value.to_string()),
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::InvariantViolation(msg) => ServiceError::Validation(msg),
            DomainError::NotFound(msg) => ServiceError::NotFound(msg),
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
        }
    }
}

impl<E> From<CommitError<E>> for ServiceError
where
    ServiceError: From<E>,
{
    fn from(value: CommitError<E>) -> Self {
        match value {
            CommitError::Repository(err) => err.into(),
            CommitError::SideEffect(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foodrescue_core::ExpectedVersion;
    use foodrescue_orders::OrderStatus;
    use foodrescue_pickup::TokenRejection;

    #[test]
    fn only_transient_failures_are_retryable() {
        let conflict: ServiceError = RepositoryError::ConcurrentModification {
            order_id: OrderId::new(1),
            expected: ExpectedVersion::Exact(1),
            actual: 2,
        }
        .into();
        assert!(conflict.is_retryable());

        let timeout: ServiceError = InventoryError::LockTimeout {
            listing_id: ListingId::new(1),
            waited_ms: 10,
        }
        .into();
        assert!(timeout.is_retryable());

        let stock: ServiceError = InventoryError::InsufficientStock {
            listing_id: ListingId::new(1),
            requested: 2,
            available: 1,
        }
        .into();
        assert!(!stock.is_retryable());

        let state: ServiceError = OrderStateError {
            order_id: OrderId::new(1),
            current: OrderStatus::Collected,
            required: &[OrderStatus::Pending],
        }
        .into();
        assert!(!state.is_retryable());
    }

    #[test]
    fn token_rejections_collapse_to_one_error() {
        for reason in [TokenRejection::Unknown, TokenRejection::AlreadyUsed, TokenRejection::Expired] {
            assert_eq!(ServiceError::from(TokenError::Rejected(reason)), ServiceError::TokenInvalid);
        }
    }

    #[test]
    fn commit_errors_unwrap_their_cause() {
        let err: ServiceError = CommitError::<InventoryError>::Repository(RepositoryError::NotFound(OrderId::new(4))).into();
        assert_eq!(err, ServiceError::NotFound("order 4".to_string()));

        let err: ServiceError = CommitError::SideEffect(ServiceError::TokenInvalid).into();
        assert_eq!(err, ServiceError::TokenInvalid);
    }

    #[test]
    fn failed_compensation_is_not_retryable() {
        let err = ServiceError::CompensationFailed {
            order_id: OrderId::new(3),
            unreleased: vec![ReservationLine::new(ListingId::new(1), 2)],
            reason: "quantity overflow on listing 1".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("1 listing(s)"));
    }
}
