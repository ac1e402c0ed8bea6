//! Application layer: wires the reservation engine, order repository and
//! token store into the order state machine, plus configuration loading.

pub mod config;
pub mod error;
pub mod order_service;

pub use config::{ConfigError, ServiceConfig};
pub use error::ServiceError;
pub use order_service::{
    InMemoryOrderService, OrderEnvelope, OrderService, PlaceOrder, ServiceResult,
};
