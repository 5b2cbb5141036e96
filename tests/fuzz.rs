//! Fuzz Test - Compares the AVL book against a reference implementation.
//!
//! Uses a naive but correct sorted-vector model to verify the tree
//! produces identical contents, plus property tests for the structural
//! invariants.

use avl_exchange::{Order, OrderBook, Price, Side};
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Simple reference implementation for verification
struct ReferenceBook {
    orders: Vec<Order>,
}

impl ReferenceBook {
    fn new() -> Self {
        Self { orders: Vec::new() }
    }

    fn insert(&mut self, order: Order) {
        self.orders.push(order);
    }

    fn remove(&mut self, order: &Order) -> bool {
        match self.orders.iter().position(|o| o.id() == order.id()) {
            Some(pos) => {
                self.orders.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    fn has_price(&self, price: Price) -> bool {
        self.orders.iter().any(|o| o.price() == price)
    }

    /// (price, id) pairs sorted for comparison with the tree
    fn sorted_keys(&self) -> Vec<(Price, String)> {
        let mut keys: Vec<_> = self
            .orders
            .iter()
            .map(|o| (o.price(), o.id().as_str().to_owned()))
            .collect();
        keys.sort();
        keys
    }
}

fn tree_keys(book: &OrderBook) -> Vec<(Price, String)> {
    let in_order: Vec<_> = book.iter().collect();
    assert!(
        in_order.windows(2).all(|w| w[0].price() <= w[1].price()),
        "traversal not sorted by price"
    );
    let mut keys: Vec<_> = in_order
        .iter()
        .map(|o| (o.price(), o.id().as_str().to_owned()))
        .collect();
    keys.sort();
    keys
}

fn run_fuzz(seed: u64, ops: usize, price_range: std::ops::Range<Price>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut book = OrderBook::new();
    let mut reference = ReferenceBook::new();
    let mut live: Vec<Order> = Vec::new();

    for step in 0..ops {
        let roll: f64 = rng.gen();
        if live.is_empty() || roll < 0.55 {
            let order = Order::with_id(format!("s{seed}-{step}"), Side::Buy, rng.gen_range(price_range.clone()));
            book.insert(order.clone());
            reference.insert(order.clone());
            live.push(order);
        } else if roll < 0.9 {
            let order = live.swap_remove(rng.gen_range(0..live.len()));
            let removed = book.remove(&order);
            assert!(reference.remove(&order));
            assert_eq!(removed.as_ref().map(|o| o.id()), Some(order.id()), "seed {seed} step {step}");
        } else {
            // Remove something that was never inserted
            let ghost = Order::with_id(format!("ghost-{step}"), Side::Buy, rng.gen_range(price_range.clone()));
            assert!(book.remove(&ghost).is_none());
            assert!(!reference.remove(&ghost));
        }

        let lookup = rng.gen_range(price_range.clone());
        assert_eq!(
            book.search(lookup).is_some(),
            reference.has_price(lookup),
            "search({lookup}) disagrees at seed {seed} step {step}"
        );
        if let Some(found) = book.search(lookup) {
            assert_eq!(found.price(), lookup);
        }

        if step % 64 == 0 {
            assert!(book.is_balanced(), "unbalanced at seed {seed} step {step}");
            assert_eq!(tree_keys(&book), reference.sorted_keys());
        }
    }

    assert!(book.is_balanced());
    assert_eq!(book.len(), reference.orders.len());
    assert_eq!(tree_keys(&book), reference.sorted_keys());
}

#[test]
fn fuzz_against_reference_wide_prices() {
    for seed in 0..10 {
        run_fuzz(seed, 5_000, 1..10_000);
    }
}

#[test]
fn fuzz_against_reference_narrow_prices() {
    // Narrow range forces many equal-price nodes through rotations
    for seed in 100..110 {
        run_fuzz(seed, 5_000, 1..8);
    }
}

// ============================================================================
// Property tests
// ============================================================================

fn build(prices: &[Price]) -> (OrderBook, Vec<Order>) {
    let mut book = OrderBook::new();
    let orders: Vec<_> = prices
        .iter()
        .enumerate()
        .map(|(i, &p)| Order::with_id(format!("p{i}"), Side::Sell, p))
        .collect();
    for order in &orders {
        book.insert(order.clone());
    }
    (book, orders)
}

proptest! {
    #[test]
    fn prop_traversal_is_sorted(prices in prop::collection::vec(1i64..500, 0..300)) {
        let (book, _) = build(&prices);
        let traversed: Vec<Price> = book.iter().map(Order::price).collect();
        let mut expected = prices.clone();
        expected.sort();
        prop_assert_eq!(traversed, expected);
    }

    #[test]
    fn prop_height_is_logarithmic(prices in prop::collection::vec(1i64..1_000, 0..500)) {
        let (book, _) = build(&prices);
        prop_assert!(book.is_balanced());
        let n = book.len() as f64;
        prop_assert!(f64::from(book.height()) <= 1.45 * (n + 2.0).log2());
    }

    #[test]
    fn prop_search_finds_inserted(
        prices in prop::collection::vec(1i64..200, 1..200),
        lookup in 1i64..200,
    ) {
        let (book, _) = build(&prices);
        for &p in &prices {
            prop_assert_eq!(book.search(p).map(Order::price), Some(p));
        }
        prop_assert_eq!(book.search(lookup).is_some(), prices.contains(&lookup));
    }

    #[test]
    fn prop_remove_exactly_one(
        prices in prop::collection::vec(1i64..20, 1..200),
        pick in any::<prop::sample::Index>(),
    ) {
        let (mut book, orders) = build(&prices);
        let victim = &orders[pick.index(orders.len())];

        let removed = book.remove(victim);
        prop_assert_eq!(removed.as_ref().map(|o| o.id()), Some(victim.id()));
        prop_assert_eq!(book.len(), orders.len() - 1);
        prop_assert!(!book.contains(victim));
        prop_assert!(book.is_balanced());
        for other in orders.iter().filter(|o| o.id() != victim.id()) {
            prop_assert!(book.contains(other));
        }

        // Second removal is a no-op
        prop_assert!(book.remove(victim).is_none());
        prop_assert_eq!(book.len(), orders.len() - 1);
    }

    #[test]
    fn prop_drain_leaves_empty_balanced(prices in prop::collection::vec(1i64..50, 0..200)) {
        let (mut book, orders) = build(&prices);
        for order in orders.iter().rev() {
            prop_assert!(book.remove(order).is_some());
            prop_assert!(book.is_balanced());
        }
        prop_assert!(book.is_empty());
        prop_assert_eq!(book.height(), -1);
    }
}
