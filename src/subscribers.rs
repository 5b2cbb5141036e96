//! Price subscribers - fire-and-forget last-traded-price notifications.
//!
//! Every subscriber owns a delivery thread fed by its own channel, so a
//! slow callback only delays itself and sees prices in the order they were
//! published. A panicking callback is caught and logged; its thread keeps
//! serving later prices.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::ExchangeError;
use crate::order::Price;

/// Handle returned by [`Subscribers::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Subscriber {
    id: SubscriptionId,
    tx: Sender<Price>,
}

/// Ordered list of price-change subscribers.
#[derive(Default)]
pub struct Subscribers {
    entries: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` and start its delivery thread.
    pub fn subscribe<F>(&self, callback: F) -> Result<SubscriptionId, ExchangeError>
    where
        F: FnMut(Price) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name(format!("price-subscriber-{id}"))
            .spawn(move || deliver(id, rx, callback))?;

        self.entries.lock().push(Subscriber { id, tx });
        debug!(subscriber = %id, "price subscriber registered");
        Ok(id)
    }

    /// Drop a subscriber; its thread exits once queued prices are delivered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|s| s.id != id);
        entries.len() != before
    }

    /// Offer `price` to every subscriber without waiting on any of them.
    pub fn notify(&self, price: Price) {
        // Copy the targets so no lock is held while sending.
        let targets: Vec<(SubscriptionId, Sender<Price>)> = self
            .entries
            .lock()
            .iter()
            .map(|s| (s.id, s.tx.clone()))
            .collect();

        for (id, tx) in targets {
            if tx.send(price).is_err() {
                warn!(subscriber = %id, price, "price subscriber is gone; dropping notification");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers").field("len", &self.len()).finish()
    }
}

fn deliver<F>(id: SubscriptionId, rx: Receiver<Price>, mut callback: F)
where
    F: FnMut(Price),
{
    for price in rx {
        if panic::catch_unwind(AssertUnwindSafe(|| callback(price))).is_err() {
            warn!(subscriber = %id, price, "price subscriber panicked");
        }
    }
    debug!(subscriber = %id, "price subscriber stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::RecvTimeoutError;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    #[test]
    fn test_notify_reaches_subscriber() {
        let subs = Subscribers::new();
        let (tx, rx) = mpsc::channel();
        subs.subscribe(move |p| tx.send(p).unwrap()).unwrap();

        subs.notify(150);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 150);
    }

    #[test]
    fn test_prices_delivered_in_order() {
        let subs = Subscribers::new();
        let (tx, rx) = mpsc::channel();
        subs.subscribe(move |p| tx.send(p).unwrap()).unwrap();

        for p in 1..=50 {
            subs.notify(p);
        }
        let got: Vec<_> = (0..50).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        assert_eq!(got, (1..=50).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let subs = Subscribers::new();
        subs.subscribe(|_| panic!("subscriber failure")).unwrap();

        let (tx, rx) = mpsc::channel();
        subs.subscribe(move |p| tx.send(p).unwrap()).unwrap();

        subs.notify(7);
        subs.notify(8);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 7);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 8);
    }

    #[test]
    fn test_panicking_subscriber_keeps_receiving() {
        let subs = Subscribers::new();
        let (tx, rx) = mpsc::channel();
        subs.subscribe(move |p| {
            if p == 1 {
                panic!("first price");
            }
            tx.send(p).unwrap();
        })
        .unwrap();

        subs.notify(1);
        subs.notify(2);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 2);
    }

    #[test]
    fn test_slow_subscriber_does_not_block_notify() {
        let subs = Subscribers::new();
        subs.subscribe(|_| thread::sleep(Duration::from_millis(200))).unwrap();
        let (tx, rx) = mpsc::channel();
        subs.subscribe(move |p| tx.send(p).unwrap()).unwrap();

        let start = std::time::Instant::now();
        for p in 0..5 {
            subs.notify(p);
        }
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let subs = Subscribers::new();
        let (tx, rx) = mpsc::channel();
        let id = subs.subscribe(move |p| tx.send(p).unwrap()).unwrap();
        assert_eq!(subs.len(), 1);

        assert!(subs.unsubscribe(id));
        assert!(!subs.unsubscribe(id));
        assert!(subs.is_empty());

        subs.notify(3);
        assert_eq!(rx.recv_timeout(WAIT), Err(RecvTimeoutError::Disconnected));
    }
}
