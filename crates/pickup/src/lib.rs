//! Single-use pickup credentials bound to accepted orders.
//!
//! Only the one-way hash of a token's secret is ever stored. The hash is the
//! value rendered into the QR code and presented back at the counter.

pub mod error;
pub mod store;
pub mod token;

pub use error::{TokenError, TokenRejection};
pub use store::{InMemoryPickupTokenStore, PickupTokenStore};
pub use token::{PickupToken, TOKEN_SECRET_LEN, generate_token_hash, hash_secret};
