//! `foodrescue-core` - shared domain building blocks.
//!
//! Identifiers, the domain error model, optimistic-concurrency primitives and
//! the request-scoped caller context. No infrastructure concerns live here.

pub mod aggregate;
pub mod context;
pub mod error;
pub mod id;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use context::{Actor, RequestContext};
pub use error::{DomainError, DomainResult};
pub use id::{ConsumerId, ListingId, OrderId, StoreId};
