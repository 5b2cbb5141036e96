//! Exchange - order ingestion, periodic matching and price publication.
//!
//! ```text
//! submit() --> [inbound channel] --> ingestion loop --+
//!                                                     v
//!                                   RwLock<Books { buy, sell }>
//!                                                     ^
//!            subscribers <-- notify <-- matching loop +  (every tick)
//! ```
//!
//! Both books sit behind one async reader/writer lock. The matching loop
//! waits for it only up to the configured timeout and skips the tick
//! otherwise, so a long reader never stalls matching forever.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ExchangeConfig;
use crate::error::ExchangeError;
use crate::matching::{pair_orders, Trade};
use crate::node_pool::PoolStats;
use crate::order::{Order, OrderId, Price, Side, MIN_PRICE};
use crate::order_book::OrderBook;
use crate::subscribers::{SubscriptionId, Subscribers};

/// The buy and sell books, guarded together.
#[derive(Debug)]
pub(crate) struct Books {
    buy: OrderBook,
    sell: OrderBook,
}

impl Books {
    fn with_capacity(capacity: u32) -> Self {
        Self {
            buy: OrderBook::with_capacity(capacity),
            sell: OrderBook::with_capacity(capacity),
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut OrderBook {
        match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        }
    }
}

/// Point-in-time view of both books.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSnapshot {
    /// Bids, highest price first
    pub buy_orders: Vec<Order>,
    /// Asks, lowest price first
    pub sell_orders: Vec<Order>,
    pub last_traded_price: Price,
    pub timestamp: DateTime<Utc>,
}

/// Result of one matching tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The book lock was not acquired in time; nothing was matched.
    Skipped,
    /// The cycle ran; trades are in execution order (possibly none).
    Completed(Vec<Trade>),
}

impl CycleOutcome {
    pub fn trades(&self) -> &[Trade] {
        match self {
            CycleOutcome::Skipped => &[],
            CycleOutcome::Completed(trades) => trades,
        }
    }
}

/// Activity counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeStats {
    pub accepted: u64,
    pub rejected: u64,
    pub trades: u64,
    pub skipped_cycles: u64,
    pub resting_buys: usize,
    pub resting_sells: usize,
    pub buy_pool: PoolStats,
    pub sell_pool: PoolStats,
}

/// Join handles for the loops started by [`Exchange::spawn`].
#[derive(Debug)]
pub struct ExchangeTasks {
    pub ingestion: JoinHandle<Result<(), ExchangeError>>,
    pub matching: JoinHandle<()>,
}

/// Single-instrument exchange.
pub struct Exchange {
    config: ExchangeConfig,
    books: RwLock<Books>,
    last_traded_price: AtomicI64,
    inbound_tx: mpsc::UnboundedSender<Order>,
    /// Taken by the ingestion loop when it starts
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Order>>>,
    subscribers: Subscribers,
    price_history: Mutex<VecDeque<Price>>,
    shutdown: watch::Sender<bool>,
    accepted: AtomicU64,
    rejected: AtomicU64,
    trades: AtomicU64,
    skipped_cycles: AtomicU64,
}

impl Exchange {
    /// Create an exchange with default settings and the given starting price.
    pub fn new(initial_price: Price) -> Self {
        Self::with_config(ExchangeConfig {
            initial_price,
            ..ExchangeConfig::default()
        })
    }

    pub fn with_config(config: ExchangeConfig) -> Self {
        let initial_price = config.initial_price.max(MIN_PRICE);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);

        Self {
            books: RwLock::new(Books::with_capacity(config.pool_capacity)),
            last_traded_price: AtomicI64::new(initial_price),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            subscribers: Subscribers::new(),
            price_history: Mutex::new(VecDeque::with_capacity(config.price_history_len)),
            shutdown,
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            trades: AtomicU64::new(0),
            skipped_cycles: AtomicU64::new(0),
            config,
        }
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    // ========================================================================
    // Order entry
    // ========================================================================

    /// Create and submit an order; returns its id once queued.
    pub fn submit(&self, side: Side, price: Price) -> Result<OrderId, ExchangeError> {
        let order = Order::new(side, price);
        let id = order.id().clone();
        self.submit_order(order)?;
        Ok(id)
    }

    /// Validate and queue an order for ingestion.
    ///
    /// Orders priced below [`MIN_PRICE`] are dropped and never retried.
    pub fn submit_order(&self, order: Order) -> Result<(), ExchangeError> {
        self.validate(&order)?;
        self.inbound_tx
            .send(order)
            .map_err(|_| ExchangeError::QueueClosed)
    }

    /// Insert an order straight into its book.
    ///
    /// Orders priced below [`MIN_PRICE`] are rejected and never rest.
    pub async fn ingest(&self, order: Order) -> Result<(), ExchangeError> {
        self.validate(&order)?;
        let mut books = self.books.write().await;
        debug!(order_id = %order.id(), side = %order.side(), price = order.price(), "accepted order");
        books.side_mut(order.side()).insert(order);
        self.accepted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn validate(&self, order: &Order) -> Result<(), ExchangeError> {
        if order.has_valid_price() {
            return Ok(());
        }
        self.rejected.fetch_add(1, Ordering::Relaxed);
        warn!(
            order_id = %order.id(),
            price = order.price(),
            min = MIN_PRICE,
            "rejected order with invalid price"
        );
        Err(ExchangeError::InvalidPrice {
            id: order.id().clone(),
            price: order.price(),
            min: MIN_PRICE,
        })
    }

    /// Drain the inbound queue into the books until shutdown.
    pub async fn run_ingestion(&self) -> Result<(), ExchangeError> {
        let mut inbound = self
            .inbound_rx
            .lock()
            .take()
            .ok_or(ExchangeError::IngestionAlreadyRunning)?;
        info!("ingestion loop started");

        loop {
            tokio::select! {
                // Shutdown wins over a non-empty queue.
                biased;
                _ = self.wait_for_shutdown() => break,
                maybe_order = inbound.recv() => match maybe_order {
                    // Rejections are counted and logged by `ingest`.
                    Some(order) => { let _ = self.ingest(order).await; }
                    None => break,
                },
            }
        }

        // Return the receiver so a second call reports `Ok` instead of
        // `IngestionAlreadyRunning`. The shutdown flag stays set, so any
        // later loop exits at once and leaves queued orders unread.
        *self.inbound_rx.lock() = Some(inbound);
        info!("ingestion loop stopped");
        Ok(())
    }

    // ========================================================================
    // Matching
    // ========================================================================

    /// Run [`match_cycle`](Self::match_cycle) every match interval until shutdown.
    pub async fn run_matching(&self) {
        let mut ticker = tokio::time::interval(self.config.match_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; matching starts one period in.
        ticker.tick().await;
        info!(interval_ms = self.config.match_interval_ms, "matching loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.match_cycle().await;
                }
                _ = self.wait_for_shutdown() => break,
            }
        }
        info!("matching loop stopped");
    }

    /// One matching pass over both books.
    ///
    /// Gives up after the configured lock timeout without touching either
    /// book. Subscribers are notified after the lock is released.
    pub async fn match_cycle(&self) -> CycleOutcome {
        let mut books =
            match tokio::time::timeout(self.config.lock_timeout(), self.books.write()).await {
                Ok(guard) => guard,
                Err(_) => {
                    self.skipped_cycles.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        timeout_ms = self.config.lock_timeout_ms,
                        "failed to acquire book lock within timeout, skipping this cycle"
                    );
                    return CycleOutcome::Skipped;
                }
            };

        let mut bids = books.buy.in_order_traversal();
        bids.reverse();
        let asks = books.sell.in_order_traversal();

        let pairs = pair_orders(bids, asks);
        let mut trades = Vec::with_capacity(pairs.len());

        for pair in pairs {
            let trade = pair.into_trade();
            self.last_traded_price.store(trade.price, Ordering::Release);
            info!(
                buy_id = %trade.buy.id(),
                buy_price = trade.buy.price(),
                sell_id = %trade.sell.id(),
                sell_price = trade.sell.price(),
                ltp = trade.price,
                "matched orders"
            );
            books.buy.remove(&trade.buy);
            books.sell.remove(&trade.sell);
            trades.push(trade);
        }
        drop(books);

        if !trades.is_empty() {
            self.trades.fetch_add(trades.len() as u64, Ordering::Relaxed);
            self.record_history(&trades);
            for trade in &trades {
                self.subscribers.notify(trade.price);
            }
        }

        CycleOutcome::Completed(trades)
    }

    fn record_history(&self, trades: &[Trade]) {
        let cap = self.config.price_history_len;
        if cap == 0 {
            return;
        }
        let mut history = self.price_history.lock();
        for trade in trades {
            if history.len() == cap {
                history.pop_front();
            }
            history.push_back(trade.price);
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Last traded price, never below [`MIN_PRICE`].
    #[inline]
    pub fn current_price(&self) -> Price {
        self.last_traded_price.load(Ordering::Acquire)
    }

    /// Both books truncated to the configured snapshot depth.
    pub async fn snapshot(&self) -> BookSnapshot {
        self.snapshot_with_depth(Some(self.config.snapshot_depth)).await
    }

    /// Both books, optionally truncated to `depth` orders per side.
    pub async fn snapshot_with_depth(&self, depth: Option<usize>) -> BookSnapshot {
        let books = self.books.read().await;
        let depth = depth.unwrap_or(usize::MAX);

        let buy_orders: Vec<Order> = {
            let mut all = books.buy.in_order_traversal();
            all.reverse();
            all.truncate(depth);
            all
        };
        let sell_orders: Vec<Order> = books.sell.iter().take(depth).cloned().collect();

        BookSnapshot {
            buy_orders,
            sell_orders,
            last_traded_price: self.current_price(),
            timestamp: Utc::now(),
        }
    }

    /// Register a callback for last-traded-price changes.
    pub fn subscribe<F>(&self, callback: F) -> Result<SubscriptionId, ExchangeError>
    where
        F: FnMut(Price) + Send + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Most recent trade prices, oldest first.
    pub fn price_history(&self) -> Vec<Price> {
        self.price_history.lock().iter().copied().collect()
    }

    pub async fn stats(&self) -> ExchangeStats {
        let books = self.books.read().await;
        ExchangeStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            trades: self.trades.load(Ordering::Relaxed),
            skipped_cycles: self.skipped_cycles.load(Ordering::Relaxed),
            resting_buys: books.buy.len(),
            resting_sells: books.sell.len(),
            buy_pool: books.buy.pool_stats(),
            sell_pool: books.sell.pool_stats(),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the ingestion and matching loops on the current tokio runtime.
    pub fn spawn(self: &Arc<Self>) -> ExchangeTasks {
        let ingest = Arc::clone(self);
        let matcher = Arc::clone(self);
        ExchangeTasks {
            ingestion: tokio::spawn(async move { ingest.run_ingestion().await }),
            matching: tokio::spawn(async move { matcher.run_matching().await }),
        }
    }

    /// Signal both loops to stop.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Resolves once [`shutdown`](Self::shutdown) has been called.
    ///
    /// Holds no borrow of the flag after it resolves, so it is safe as a
    /// `select!` branch next to arms that await.
    pub async fn wait_for_shutdown(&self) {
        let mut signal = self.shutdown.subscribe();
        // Err only if the sender is gone, which cannot outlive `self`.
        let _ = signal.wait_for(|stop| *stop).await;
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::with_config(ExchangeConfig::default())
    }
}
