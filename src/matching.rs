//! Matching - greedy pairing of resting bids against resting asks.
//!
//! A cycle pairs the highest bids with the cheapest asks. Each order takes
//! part in at most one pair per cycle and trades at the ask price.

use serde::Serialize;

use crate::order::{Order, Price, MIN_PRICE};

/// A buy and a sell that cross.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchedPair {
    pub buy: Order,
    pub sell: Order,
}

impl MatchedPair {
    /// Execution price: the ask, never below the venue floor.
    #[inline]
    pub fn trade_price(&self) -> Price {
        self.sell.price().max(MIN_PRICE)
    }

    /// Settle this pair into a trade record.
    pub fn into_trade(self) -> Trade {
        let price = self.trade_price();
        Trade {
            buy: self.buy,
            sell: self.sell,
            price,
        }
    }
}

/// An executed match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Trade {
    pub buy: Order,
    pub sell: Order,
    pub price: Price,
}

/// Whether a bid at `buy` crosses an ask at `sell`.
#[inline]
pub fn crosses(buy: Price, sell: Price) -> bool {
    buy >= sell
}

/// Pair bids (descending by price) with asks (ascending by price).
///
/// For each bid, the first still-unpaired ask with `ask <= bid` is taken.
/// Asks are ascending, so that ask is always the cheapest unpaired one; once
/// it fails to cross, no lower bid can cross either.
pub fn pair_orders<B, A>(bids_desc: B, asks_asc: A) -> Vec<MatchedPair>
where
    B: IntoIterator<Item = Order>,
    A: IntoIterator<Item = Order>,
{
    let mut asks = asks_asc.into_iter().peekable();
    let mut pairs = Vec::new();

    for buy in bids_desc {
        let Some(best_ask) = asks.peek() else {
            break;
        };
        if !crosses(buy.price(), best_ask.price()) {
            break;
        }
        if let Some(sell) = asks.next() {
            pairs.push(MatchedPair { buy, sell });
        }
    }

    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Side;

    fn bids(prices: &[Price]) -> Vec<Order> {
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| Order::with_id(format!("B{i}"), Side::Buy, *p))
            .collect()
    }

    fn asks(prices: &[Price]) -> Vec<Order> {
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| Order::with_id(format!("S{i}"), Side::Sell, *p))
            .collect()
    }

    #[test]
    fn test_single_cross_trades_at_ask() {
        let pairs = pair_orders(bids(&[110]), asks(&[90]));
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].trade_price(), 90);
    }

    #[test]
    fn test_equal_prices_cross() {
        let pairs = pair_orders(bids(&[100]), asks(&[100]));
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn test_no_cross() {
        assert!(pair_orders(bids(&[90, 80]), asks(&[100, 120])).is_empty());
    }

    #[test]
    fn test_one_sided_books() {
        assert!(pair_orders(bids(&[100, 90]), Vec::new()).is_empty());
        assert!(pair_orders(Vec::new(), asks(&[100])).is_empty());
    }

    #[test]
    fn test_greedy_pairing_order() {
        // Best bid takes the cheapest ask, next bid the next ask.
        let pairs = pair_orders(bids(&[120, 105, 95]), asks(&[100, 104, 110]));
        let got: Vec<_> = pairs
            .iter()
            .map(|p| (p.buy.price(), p.sell.price()))
            .collect();
        assert_eq!(got, vec![(120, 100), (105, 104)]);
    }

    #[test]
    fn test_each_order_matches_once() {
        let pairs = pair_orders(bids(&[200, 200, 200]), asks(&[50]));
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].buy.id().as_str(), "B0");
    }

    #[test]
    fn test_trade_price_floor() {
        let pair = MatchedPair {
            buy: Order::with_id("b", Side::Buy, 5),
            sell: Order::with_id("s", Side::Sell, -3),
        };
        assert_eq!(pair.trade_price(), MIN_PRICE);
        assert_eq!(pair.into_trade().price, MIN_PRICE);
    }
}
