use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use foodrescue_core::OrderId;

use crate::error::TokenRejection;

/// Bytes of randomness behind each token.
pub const TOKEN_SECRET_LEN: usize = 32;

/// Pickup credential for one accepted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupToken {
    pub order_id: OrderId,
    pub qr_token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl PickupToken {
    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Why this token cannot be redeemed at `now`, if anything.
    pub fn rejection(&self, now: DateTime<Utc>) -> Option<TokenRejection> {
        if self.is_used() {
            Some(TokenRejection::AlreadyUsed)
        } else if self.is_expired(now) {
            Some(TokenRejection::Expired)
        } else {
            None
        }
    }
}

/// SHA-256 of `secret`, base64url without padding.
pub fn hash_secret(secret: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(secret))
}

/// Draw a fresh secret from the thread-local CSPRNG and return only its hash.
pub fn generate_token_hash() -> String {
    let mut secret = [0u8; TOKEN_SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut secret);
    hash_secret(&secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn hash_is_url_safe_and_unpadded() {
        let hash = hash_secret(b"pickup");
        assert_eq!(hash.len(), 43);
        assert!(!hash.contains('='));
        assert!(!hash.contains('+') && !hash.contains('/'));
        assert_eq!(hash, hash_secret(b"pickup"));
    }

    #[test]
    fn generated_hashes_differ() {
        assert_ne!(generate_token_hash(), generate_token_hash());
    }

    #[test]
    fn rejection_prefers_used_over_expired() {
        let issued_at = Utc::now();
        let mut token = PickupToken {
            order_id: OrderId::new(1),
            qr_token_hash: generate_token_hash(),
            issued_at,
            expires_at: issued_at + Duration::hours(24),
            used_at: None,
        };

        assert_eq!(token.rejection(issued_at), None);
        assert_eq!(token.rejection(token.expires_at), Some(TokenRejection::Expired));

        token.used_at = Some(issued_at);
        assert_eq!(
            token.rejection(issued_at + Duration::hours(30)),
            Some(TokenRejection::AlreadyUsed)
        );
    }
}
