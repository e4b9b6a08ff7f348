//! Per-symbol price fan-out
//!
//! The hub is the locally tracked view of the market: it remembers the last
//! tick and a rolling range per symbol and broadcasts every tick to the
//! watchers subscribed to that symbol.

use super::{PriceTick, RangeTracker};
use chrono::Duration;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};

/// Ticks buffered per subscriber before it starts lagging
const CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct HubState {
    channels: HashMap<String, broadcast::Sender<PriceTick>>,
    last: HashMap<String, PriceTick>,
    ranges: HashMap<String, RangeTracker>,
}

/// Fans out price ticks to per-symbol subscribers
pub struct PriceHub {
    state: RwLock<HubState>,
    range_window: Duration,
}

impl PriceHub {
    pub fn new(range_window: Duration) -> Self {
        Self {
            state: RwLock::new(HubState::default()),
            range_window,
        }
    }

    /// Record a tick and deliver it to the symbol's subscribers
    pub async fn publish(&self, tick: PriceTick) {
        let mut state = self.state.write().await;
        let window = self.range_window;
        state
            .ranges
            .entry(tick.symbol.clone())
            .or_insert_with(|| RangeTracker::new(window))
            .update(tick.timestamp, tick.price);
        state.last.insert(tick.symbol.clone(), tick.clone());

        let symbol = tick.symbol.clone();
        let no_receivers = match state.channels.get(&symbol) {
            Some(sender) => sender.send(tick).is_err(),
            None => false,
        };
        if no_receivers {
            // Every watcher for this symbol is gone
            state.channels.remove(&symbol);
            tracing::debug!(%symbol, "Released price channel");
        }
    }

    /// Subscribe to ticks for `symbol`; dropping the receiver unsubscribes
    pub async fn subscribe(&self, symbol: &str) -> broadcast::Receiver<PriceTick> {
        let mut state = self.state.write().await;
        state
            .channels
            .entry(symbol.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub async fn last_tick(&self, symbol: &str) -> Option<PriceTick> {
        self.state.read().await.last.get(symbol).cloned()
    }

    pub async fn last_price(&self, symbol: &str) -> Option<Decimal> {
        self.last_tick(symbol).await.map(|t| t.price)
    }

    /// Realized range over the window as a fraction of the last price
    pub async fn realized_range(&self, symbol: &str) -> Option<Decimal> {
        self.state
            .read()
            .await
            .ranges
            .get(symbol)
            .and_then(RangeTracker::range_pct)
    }

    /// Number of live subscribers for `symbol`
    pub async fn subscriber_count(&self, symbol: &str) -> usize {
        self.state
            .read()
            .await
            .channels
            .get(symbol)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    /// Forward ticks from a feed until it closes
    pub async fn run(self: Arc<Self>, mut feed: mpsc::Receiver<PriceTick>) {
        while let Some(tick) = feed.recv().await {
            self.publish(tick).await;
        }
        tracing::info!("Price feed closed");
    }
}
