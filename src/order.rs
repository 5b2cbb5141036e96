//! Order types flowing through the books.
//!
//! Orders are immutable once created. Identity is a process-unique string
//! so orders resting at the same price can be told apart.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Signed integer price in ticks.
pub type Price = i64;

/// Lowest price an order may carry; also the floor for the last traded price.
pub const MIN_PRICE: Price = 1;

/// Order side
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Bid side
    Buy,
    /// Ask side
    Sell,
}

impl Side {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last stamp handed out by [`OrderId::generate`].
static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// Wall-clock nanoseconds, bumped so that every call returns a strictly
/// larger value than the previous one in this process.
fn next_stamp() -> i64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);

    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_STAMP.compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}

/// Process-unique order identity, e.g. `BUY-1729331400123456789`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Generate a fresh id for an order on `side`.
    pub fn generate(side: Side) -> Self {
        Self(format!("{}-{}", side, next_stamp()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resting or inbound limit order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    side: Side,
    price: Price,
}

impl Order {
    /// Create an order with a freshly generated id.
    pub fn new(side: Side, price: Price) -> Self {
        Self {
            id: OrderId::generate(side),
            side,
            price,
        }
    }

    /// Create an order with a caller-chosen id (replays, tests).
    pub fn with_id(id: impl Into<OrderId>, side: Side, price: Price) -> Self {
        Self {
            id: id.into(),
            side,
            price,
        }
    }

    #[inline]
    pub fn id(&self) -> &OrderId {
        &self.id
    }

    #[inline]
    pub fn side(&self) -> Side {
        self.side
    }

    #[inline]
    pub fn price(&self) -> Price {
        self.price
    }

    /// Whether the price clears the venue floor.
    #[inline]
    pub fn has_valid_price(&self) -> bool {
        self.price >= MIN_PRICE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_new_order() {
        let order = Order::new(Side::Buy, 100);
        assert_eq!(order.side(), Side::Buy);
        assert_eq!(order.price(), 100);
        assert!(order.id().as_str().starts_with("BUY-"));

        let order = Order::new(Side::Sell, 42);
        assert!(order.id().as_str().starts_with("SELL-"));
    }

    #[test]
    fn test_ids_distinct_in_tight_loop() {
        let ids: HashSet<OrderId> = (0..10_000)
            .map(|_| Order::new(Side::Buy, 1).id().clone())
            .collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_ids_distinct_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..1000)
                        .map(|_| OrderId::generate(Side::Sell))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(all.insert(id), "duplicate id generated");
            }
        }
        assert_eq!(all.len(), 8000);
    }

    #[test]
    fn test_price_validity() {
        assert!(Order::new(Side::Buy, 1).has_valid_price());
        assert!(!Order::new(Side::Buy, 0).has_valid_price());
        assert!(!Order::new(Side::Sell, -5).has_valid_price());
    }

    #[test]
    fn test_serialize_shape() {
        let order = Order::with_id("BUY-1", Side::Buy, 90);
        let json = serde_json::to_string(&order).unwrap();
        assert_eq!(json, r#"{"id":"BUY-1","side":"BUY","price":90}"#);
    }
}
