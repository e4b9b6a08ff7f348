//! Price feed types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single price tick from an exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    /// Trading symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Last traded price
    pub price: Decimal,
    /// Local timestamp when tick was received
    pub timestamp: DateTime<Utc>,
    /// Exchange timestamp
    pub exchange_ts: DateTime<Utc>,
}

impl PriceTick {
    /// Tick stamped now on both clocks
    pub fn now(symbol: impl Into<String>, price: Decimal) -> Self {
        let now = Utc::now();
        Self {
            symbol: symbol.into(),
            price,
            timestamp: now,
            exchange_ts: now,
        }
    }
}
