//! # AVL Exchange
//!
//! A single-instrument exchange simulator: orders rest in price-ordered
//! books, a periodic matching loop pairs crossing orders, and every trade
//! price is pushed to subscribers.
//!
//! ## Design Principles
//!
//! - **Balanced Books**: each side is an AVL tree keyed by price, so insert,
//!   search and remove stay O(log n) under any arrival order
//! - **Arena Nodes**: tree nodes live in a contiguous pool with a free list;
//!   removed nodes are recycled instead of freed
//! - **Bounded Matching**: the matching loop waits a bounded time for the
//!   book lock and skips the tick otherwise
//! - **Isolated Subscribers**: price notifications are queued per subscriber
//!   and delivered off the matching path
//!
//! ## Architecture
//!
//! ```text
//! [Order Sources] --> submit() --> [Inbound Channel] --> [Ingestion Loop]
//!                                                              |
//!                                                  [Buy Book | Sell Book]
//!                                                              |
//!                        [Subscribers] <-- LTP <-- [Matching Loop (1s)]
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod generator;
pub mod logging;
pub mod matching;
pub mod node_pool;
pub mod order;
pub mod order_book;
pub mod shared_book;
pub mod subscribers;

// Re-exports for convenience
pub use config::{Config, ExchangeConfig, GeneratorConfig};
pub use engine::{BookSnapshot, CycleOutcome, Exchange, ExchangeStats, ExchangeTasks};
pub use error::{ConfigError, ExchangeError};
pub use generator::OrderGenerator;
pub use matching::{pair_orders, MatchedPair, Trade};
pub use node_pool::{NodeIndex, NodePool, PoolStats, NULL_INDEX};
pub use order::{Order, OrderId, Price, Side, MIN_PRICE};
pub use order_book::OrderBook;
pub use shared_book::ConcurrentOrderBook;
pub use subscribers::{SubscriptionId, Subscribers};
