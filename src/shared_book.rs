//! Concurrent Order Book - an [`OrderBook`] behind a reader/writer lock.
//!
//! Writers (insert/remove) are exclusive; searches and traversals run
//! concurrently with each other. Removed nodes go back to the book's pool
//! while the write lock is held, so heavy churn does not hit the allocator.

use parking_lot::RwLock;

use crate::node_pool::PoolStats;
use crate::order::{Order, Price};
use crate::order_book::OrderBook;

/// Thread-safe order book, shareable via `Arc`.
#[derive(Debug, Default)]
pub struct ConcurrentOrderBook {
    inner: RwLock<OrderBook>,
}

impl ConcurrentOrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a book whose pool starts with `capacity` free nodes.
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            inner: RwLock::new(OrderBook::with_capacity(capacity)),
        }
    }

    pub fn insert(&self, order: Order) {
        self.inner.write().insert(order);
    }

    /// Remove a specific order by identity; `None` if it was not resting.
    pub fn remove(&self, order: &Order) -> Option<Order> {
        self.inner.write().remove(order)
    }

    /// Clone of the first order found at `price`.
    pub fn search(&self, price: Price) -> Option<Order> {
        self.inner.read().search(price).cloned()
    }

    pub fn contains(&self, order: &Order) -> bool {
        self.inner.read().contains(order)
    }

    pub fn in_order_traversal(&self) -> Vec<Order> {
        self.inner.read().in_order_traversal()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn height(&self) -> i32 {
        self.inner.read().height()
    }

    pub fn is_balanced(&self) -> bool {
        self.inner.read().is_balanced()
    }

    /// Node pool allocation/recycle counters.
    pub fn stats(&self) -> PoolStats {
        self.inner.read().pool_stats()
    }

    /// Run `f` against the book under the read lock.
    pub fn with_read<R>(&self, f: impl FnOnce(&OrderBook) -> R) -> R {
        let guard = self.inner.read();
        f(&*guard)
    }
}
