//! REST polling price feed

use super::{PriceFeed, PriceTick};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;

/// Ticker price response
#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

/// Polls the public ticker endpoint for a fixed set of symbols
pub struct BinancePoller {
    base_url: String,
    symbols: Vec<String>,
    interval: Duration,
    client: reqwest::Client,
}

impl BinancePoller {
    pub fn new(
        base_url: impl Into<String>,
        symbols: Vec<String>,
        interval: Duration,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into(),
            symbols: symbols.into_iter().map(|s| s.to_uppercase()).collect(),
            interval,
            client,
        })
    }

    fn ticker_url(&self, symbol: &str) -> String {
        format!("{}/api/v3/ticker/price?symbol={}", self.base_url, symbol)
    }

    /// Parse a ticker response into a PriceTick
    fn parse_ticker(body: &str) -> Option<PriceTick> {
        let ticker: TickerPrice = serde_json::from_str(body).ok()?;
        let price = Decimal::from_str(&ticker.price).ok()?;
        if price <= Decimal::ZERO {
            return None;
        }
        Some(PriceTick {
            symbol: ticker.symbol,
            price,
            timestamp: Utc::now(),
            exchange_ts: Utc::now(),
        })
    }

    async fn poll_once(client: &reqwest::Client, url: &str) -> anyhow::Result<Option<PriceTick>> {
        let body = client.get(url).send().await?.error_for_status()?.text().await?;
        Ok(Self::parse_ticker(&body))
    }
}

#[async_trait]
impl PriceFeed for BinancePoller {
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<PriceTick>> {
        let (tick_tx, tick_rx) = mpsc::channel(1024);
        let urls: Vec<String> = self.symbols.iter().map(|s| self.ticker_url(s)).collect();
        let client = self.client.clone();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            symbols = ?self.symbols,
            interval_ms = self.interval.as_millis() as u64,
            "Starting price poller"
        );

        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                for url in &urls {
                    match Self::poll_once(&client, url).await {
                        Ok(Some(tick)) => {
                            if tick_tx.send(tick).await.is_err() {
                                tracing::debug!("Tick receiver dropped, stopping poller");
                                return;
                            }
                        }
                        Ok(None) => tracing::warn!(%url, "Unparseable ticker response"),
                        Err(e) => tracing::warn!(error = %e, %url, "Price poll failed"),
                    }
                }
            }
        });

        Ok(tick_rx)
    }
}
