//! Order storage with version-checked commits.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use foodrescue_core::{AggregateRoot, ConsumerId, ExpectedVersion, OrderId, StoreId};

use crate::order::{Order, OrderStatus};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("order {0} not found")]
    NotFound(OrderId),

    #[error("order {0} already exists")]
    AlreadyExists(OrderId),

    /// Somebody else committed between this writer's read and its commit.
    #[error("order {order_id} was modified concurrently (expected: {expected:?}, actual: {actual})")]
    ConcurrentModification {
        order_id: OrderId,
        expected: ExpectedVersion,
        actual: u64,
    },

    #[error("timed out after {waited_ms}ms waiting for the lock on order {order_id}")]
    LockTimeout { order_id: OrderId, waited_ms: u64 },
}

impl RepositoryError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RepositoryError::ConcurrentModification { .. } | RepositoryError::LockTimeout { .. }
        )
    }
}

/// Failure of [`OrderRepository::commit_with`]: either the commit itself was
/// refused, or the side effects run inside it failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommitError<E> {
    #[error(transparent)]
    Repository(RepositoryError),

    #[error("side effect failed: {0}")]
    SideEffect(E),
}

/// Query over the order set. Unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub store_id: Option<StoreId>,
    pub consumer_id: Option<ConsumerId>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_store(mut self, store_id: StoreId) -> Self {
        self.store_id = Some(store_id);
        self
    }

    pub fn for_consumer(mut self, consumer_id: ConsumerId) -> Self {
        self.consumer_id = Some(consumer_id);
        self
    }

    pub fn with_status(mut self, status: Option<OrderStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.store_id.is_none_or(|s| s == order.store_id())
            && self.consumer_id.is_none_or(|c| c == order.consumer_id())
            && self.status.is_none_or(|s| s == order.status())
    }
}

/// Storage boundary for orders.
pub trait OrderRepository: Send + Sync {
    /// Allocate a fresh order id.
    fn next_id(&self) -> OrderId;

    /// Persist a newly placed order.
    fn insert(&self, order: Order) -> Result<Order, RepositoryError>;

    fn get(&self, order_id: OrderId) -> Result<Order, RepositoryError>;

    /// Matching orders, newest first.
    fn list(&self, filter: &OrderFilter) -> Vec<Order>;

    /// Commit `next` if the stored order is still at `expected`.
    ///
    /// Runs inside the order's commit section: the version check, then
    /// `side_effects`, then the write. If `side_effects` fails nothing is
    /// written. The committed order has its version incremented by one.
    fn commit_with<E, F>(
        &self,
        next: Order,
        expected: ExpectedVersion,
        side_effects: F,
    ) -> Result<Order, CommitError<E>>
    where
        F: FnOnce() -> Result<(), E>,
        Self: Sized;
}

impl<R> OrderRepository for Arc<R>
where
    R: OrderRepository,
{
    fn next_id(&self) -> OrderId {
        (**self).next_id()
    }

    fn insert(&self, order: Order) -> Result<Order, RepositoryError> {
        (**self).insert(order)
    }

    fn get(&self, order_id: OrderId) -> Result<Order, RepositoryError> {
        (**self).get(order_id)
    }

    fn list(&self, filter: &OrderFilter) -> Vec<Order> {
        (**self).list(filter)
    }

    fn commit_with<E, F>(
        &self,
        next: Order,
        expected: ExpectedVersion,
        side_effects: F,
    ) -> Result<Order, CommitError<E>>
    where
        F: FnOnce() -> Result<(), E>,
    {
        (**self).commit_with(next, expected, side_effects)
    }
}

#[derive(Debug)]
struct Row {
    write_lock: Mutex<()>,
    state: RwLock<Order>,
}

/// In-memory order repository.
#[derive(Debug)]
pub struct InMemoryOrderRepository {
    rows: RwLock<HashMap<OrderId, Arc<Row>>>,
    next_id: AtomicU64,
    lock_timeout: Duration,
}

impl InMemoryOrderRepository {
    pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new() -> Self {
        Self::with_lock_timeout(Self::DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            lock_timeout,
        }
    }

    fn row(&self, order_id: OrderId) -> Result<Arc<Row>, RepositoryError> {
        self.rows
            .read()
            .get(&order_id)
            .cloned()
            .ok_or(RepositoryError::NotFound(order_id))
    }
}

impl Default for InMemoryOrderRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderRepository for InMemoryOrderRepository {
    fn next_id(&self) -> OrderId {
        OrderId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn insert(&self, order: Order) -> Result<Order, RepositoryError> {
        let order_id = order.order_id();
        let mut rows = self.rows.write();
        if rows.contains_key(&order_id) {
            return Err(RepositoryError::AlreadyExists(order_id));
        }
        rows.insert(
            order_id,
            Arc::new(Row {
                write_lock: Mutex::new(()),
                state: RwLock::new(order.clone()),
            }),
        );
        Ok(order)
    }

    fn get(&self, order_id: OrderId) -> Result<Order, RepositoryError> {
        let row = self.row(order_id)?;
        let snapshot = row.state.read().clone();
        Ok(snapshot)
    }

    fn list(&self, filter: &OrderFilter) -> Vec<Order> {
        let rows: Vec<Arc<Row>> = self.rows.read().values().cloned().collect();
        let mut found: Vec<Order> = rows
            .iter()
            .map(|r| r.state.read().clone())
            .filter(|o| filter.matches(o))
            .collect();
        found.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.order_id().cmp(&a.order_id()))
        });
        found
    }

    fn commit_with<E, F>(
        &self,
        mut next: Order,
        expected: ExpectedVersion,
        side_effects: F,
    ) -> Result<Order, CommitError<E>>
    where
        F: FnOnce() -> Result<(), E>,
    {
        let order_id = next.order_id();
        let row = self.row(order_id).map_err(CommitError::Repository)?;

        let waited_ms = self.lock_timeout.as_millis() as u64;
        let _guard = row.write_lock.try_lock_for(self.lock_timeout).ok_or_else(|| {
            tracing::warn!(%order_id, timeout_ms = waited_ms, "order lock wait timed out");
            CommitError::Repository(RepositoryError::LockTimeout { order_id, waited_ms })
        })?;

        let actual = row.state.read().version();
        if !expected.matches(actual) {
            return Err(CommitError::Repository(RepositoryError::ConcurrentModification {
                order_id,
                expected,
                actual,
            }));
        }

        side_effects().map_err(CommitError::SideEffect)?;

        next.set_version(actual + 1);
        *row.state.write() = next.clone();
        Ok(next)
    }
}
