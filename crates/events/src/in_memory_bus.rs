//! In-memory event bus for single-process deployments and tests.

use std::sync::mpsc;

use parking_lot::Mutex;

use crate::bus::{EventBus, Subscription};

#[derive(Debug)]
pub enum InMemoryBusError {
    /// Every subscriber has gone away; the message had nowhere to go.
    NoSubscribers,
}

/// In-memory pub/sub bus.
///
/// - No IO / no async
/// - Best-effort fan-out; dead subscribers are pruned on publish
/// - Publishing with zero subscribers is not an error
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self.subscribers.lock();
        let had_subscribers = !subs.is_empty();

        subs.retain(|tx| tx.send(message.clone()).is_ok());

        if had_subscribers && subs.is_empty() {
            return Err(InMemoryBusError::NoSubscribers);
        }
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        Subscription::new(rx)
    }
}
