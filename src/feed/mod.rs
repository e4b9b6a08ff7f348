//! Price feed module
//!
//! Market data contract (`PriceTick`), feed sources, and the hub that fans
//! ticks out to position watchers.

mod hub;
mod poller;
mod range;
mod types;

pub use hub::PriceHub;
pub use poller::BinancePoller;
pub use range::RangeTracker;
pub use types::PriceTick;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Trait for price feed implementations
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Subscribe to price updates
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<PriceTick>>;
}
