//! Runtime configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::order::Price;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub generator: GeneratorConfig,
}

/// Engine settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Starting last traded price; clamped to 1 if not positive
    pub initial_price: Price,
    /// Period of the matching loop
    pub match_interval_ms: u64,
    /// Longest the matching loop waits for the book lock before skipping a tick
    pub lock_timeout_ms: u64,
    /// Orders per side returned by `snapshot()`
    pub snapshot_depth: usize,
    /// Nodes pre-allocated in each book's pool
    pub pool_capacity: u32,
    /// Trade prices kept for `price_history()`
    pub price_history_len: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            initial_price: 100,
            match_interval_ms: 1000,
            lock_timeout_ms: 500,
            snapshot_depth: 10,
            pool_capacity: 1024,
            price_history_len: 100,
        }
    }
}

impl ExchangeConfig {
    #[inline]
    pub fn match_interval(&self) -> Duration {
        Duration::from_millis(self.match_interval_ms)
    }

    #[inline]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.match_interval_ms == 0 {
            return Err(ConfigError::Invalid("match_interval_ms must be non-zero".into()));
        }
        if self.lock_timeout_ms == 0 || self.lock_timeout_ms >= self.match_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "lock_timeout_ms ({}) must be non-zero and shorter than match_interval_ms ({})",
                self.lock_timeout_ms, self.match_interval_ms
            )));
        }
        if self.snapshot_depth == 0 {
            return Err(ConfigError::Invalid("snapshot_depth must be non-zero".into()));
        }
        Ok(())
    }
}

/// Synthetic order flow settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub tick_interval_ms: u64,
    /// Buy/sell pairs submitted per tick
    pub orders_per_tick: usize,
    /// Bids are drawn from `[ltp - buy_below, ltp]`
    pub buy_below: Price,
    /// Asks are drawn from `[ltp - sell_below, ltp + sell_above]`
    pub sell_below: Price,
    pub sell_above: Price,
    /// Fixed seed for reproducible flow; random when absent
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            orders_per_tick: 5,
            buy_below: 100,
            sell_below: 25,
            sell_above: 100,
            seed: None,
        }
    }
}

impl GeneratorConfig {
    #[inline]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be non-zero".into()));
        }
        if self.buy_below < 0 || self.sell_below < 0 || self.sell_above < 0 {
            return Err(ConfigError::Invalid("price offsets must not be negative".into()));
        }
        Ok(())
    }
}

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.exchange.validate()?;
        self.generator.validate()
    }
}
