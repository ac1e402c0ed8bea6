//! Token storage keyed by order, indexed by hash.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use foodrescue_core::OrderId;

use crate::error::{TokenError, TokenRejection};
use crate::token::{PickupToken, generate_token_hash};

/// Storage boundary for pickup tokens.
///
/// `consume` must re-validate and mark the token used as one atomic step with
/// respect to every other caller presenting the same token.
pub trait PickupTokenStore: Send + Sync {
    /// Issue the one token an order will ever have.
    fn issue(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<PickupToken, TokenError>;

    /// Order the token belongs to, if it can be redeemed at `now`.
    fn validate(&self, token_hash: &str, now: DateTime<Utc>) -> Result<OrderId, TokenError>;

    /// Redeem the token. A second call always fails.
    fn consume(
        &self,
        order_id: OrderId,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<PickupToken, TokenError>;

    fn get(&self, order_id: OrderId) -> Option<PickupToken>;
}

impl<S> PickupTokenStore for Arc<S>
where
    S: PickupTokenStore + ?Sized,
{
    fn issue(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<PickupToken, TokenError> {
        (**self).issue(order_id, now)
    }

    fn validate(&self, token_hash: &str, now: DateTime<Utc>) -> Result<OrderId, TokenError> {
        (**self).validate(token_hash, now)
    }

    fn consume(
        &self,
        order_id: OrderId,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<PickupToken, TokenError> {
        (**self).consume(order_id, token_hash, now)
    }

    fn get(&self, order_id: OrderId) -> Option<PickupToken> {
        (**self).get(order_id)
    }
}

#[derive(Debug, Default)]
struct Tokens {
    by_order: HashMap<OrderId, PickupToken>,
    by_hash: HashMap<String, OrderId>,
}

/// In-memory token store.
#[derive(Debug)]
pub struct InMemoryPickupTokenStore {
    tokens: RwLock<Tokens>,
    validity: Duration,
}

impl InMemoryPickupTokenStore {
    pub const DEFAULT_VALIDITY_HOURS: i64 = 24;

    pub fn new() -> Self {
        Self::with_validity(Duration::hours(Self::DEFAULT_VALIDITY_HOURS))
    }

    pub fn with_validity(validity: Duration) -> Self {
        Self {
            tokens: RwLock::new(Tokens::default()),
            validity,
        }
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }
}

impl Default for InMemoryPickupTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

fn rejected(reason: TokenRejection) -> TokenError {
    tracing::info!(%reason, "pickup token rejected");
    TokenError::Rejected(reason)
}

impl PickupTokenStore for InMemoryPickupTokenStore {
    fn issue(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<PickupToken, TokenError> {
        let mut tokens = self.tokens.write();
        if tokens.by_order.contains_key(&order_id) {
            return Err(TokenError::AlreadyIssued(order_id));
        }

        let token = PickupToken {
            order_id,
            qr_token_hash: generate_token_hash(),
            issued_at: now,
            expires_at: now + self.validity,
            used_at: None,
        };
        tokens.by_hash.insert(token.qr_token_hash.clone(), order_id);
        tokens.by_order.insert(order_id, token.clone());

        tracing::debug!(%order_id, expires_at = %token.expires_at, "pickup token issued");
        Ok(token)
    }

    fn validate(&self, token_hash: &str, now: DateTime<Utc>) -> Result<OrderId, TokenError> {
        let tokens = self.tokens.read();
        let token = tokens
            .by_hash
            .get(token_hash)
            .and_then(|id| tokens.by_order.get(id))
            .ok_or_else(|| rejected(TokenRejection::Unknown))?;

        match token.rejection(now) {
            Some(reason) => Err(rejected(reason)),
            None => Ok(token.order_id),
        }
    }

    fn consume(
        &self,
        order_id: OrderId,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<PickupToken, TokenError> {
        let mut tokens = self.tokens.write();
        let token = tokens
            .by_order
            .get_mut(&order_id)
            .filter(|t| t.qr_token_hash == token_hash)
            .ok_or_else(|| rejected(TokenRejection::Unknown))?;

        if let Some(reason) = token.rejection(now) {
            return Err(rejected(reason));
        }
        token.used_at = Some(now);
        Ok(token.clone())
    }

    fn get(&self, order_id: OrderId) -> Option<PickupToken> {
        self.tokens.read().by_order.get(&order_id).cloned()
    }
}
