//! Error types for the exchange and its configuration.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::order::{OrderId, Price};

/// Errors surfaced by [`Exchange`](crate::Exchange) operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExchangeError {
    /// Order price is below the venue floor; the order was dropped.
    #[error("order {id} rejected: price {price} is below the minimum of {min}")]
    InvalidPrice { id: OrderId, price: Price, min: Price },

    /// The inbound queue has no consumer left.
    #[error("inbound order queue is closed")]
    QueueClosed,

    /// `run_ingestion` was called while another ingestion loop owns the queue.
    #[error("an ingestion loop is already draining the inbound queue")]
    IngestionAlreadyRunning,

    /// A delivery thread for a price subscriber could not be started.
    #[error("failed to start subscriber delivery thread: {0}")]
    SubscriberSpawn(#[from] io::Error),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
