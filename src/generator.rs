//! Synthetic order flow around the last traded price.
//!
//! Bids are drawn at or below the current price and asks mostly above it,
//! with a band of overlap so the books cross now and then.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::config::GeneratorConfig;
use crate::engine::Exchange;
use crate::error::ExchangeError;
use crate::order::{Order, Price, Side, MIN_PRICE};

pub struct OrderGenerator {
    config: GeneratorConfig,
    rng: ChaCha8Rng,
}

impl OrderGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self { config, rng }
    }

    /// Uniform in `[max(1, ltp - buy_below), max(ltp, min + 1)]`.
    pub fn buy_price(&mut self, ltp: Price) -> Price {
        let min = ltp.saturating_sub(self.config.buy_below).max(MIN_PRICE);
        let max = ltp.max(min + 1);
        self.rng.gen_range(min..=max)
    }

    /// Uniform in `[max(1, ltp - sell_below), max(ltp + sell_above, min + 1)]`.
    pub fn sell_price(&mut self, ltp: Price) -> Price {
        let min = ltp.saturating_sub(self.config.sell_below).max(MIN_PRICE);
        let max = ltp.saturating_add(self.config.sell_above).max(min + 1);
        self.rng.gen_range(min..=max)
    }

    /// One tick's worth of orders: `orders_per_tick` buy/sell pairs.
    pub fn next_batch(&mut self, ltp: Price) -> Vec<Order> {
        let mut batch = Vec::with_capacity(self.config.orders_per_tick * 2);
        for _ in 0..self.config.orders_per_tick {
            let buy = self.buy_price(ltp);
            let sell = self.sell_price(ltp);
            batch.push(Order::new(Side::Buy, buy));
            batch.push(Order::new(Side::Sell, sell));
        }
        batch
    }

    /// Submit a batch every tick until the exchange shuts down.
    pub async fn run(mut self, exchange: Arc<Exchange>) {
        let mut ticker = tokio::time::interval(self.config.tick_interval());
        info!(
            orders_per_tick = self.config.orders_per_tick,
            interval_ms = self.config.tick_interval_ms,
            "order generator started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let ltp = exchange.current_price();
                    for order in self.next_batch(ltp) {
                        debug!(side = %order.side(), price = order.price(), "generated order");
                        match exchange.submit_order(order) {
                            Ok(()) | Err(ExchangeError::InvalidPrice { .. }) => {}
                            Err(err) => {
                                warn!(error = %err, "order generator stopping");
                                return;
                            }
                        }
                    }
                }
                _ = exchange.wait_for_shutdown() => break,
            }
        }
        info!("order generator stopped");
    }
}
