//! Lifecycle events and their in-process distribution.
//!
//! Order transitions are announced after they commit so that collaborators
//! outside the core (payment capture, notifications) can react without the core
//! calling out to them.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
