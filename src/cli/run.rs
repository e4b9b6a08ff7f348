//! Run command implementation

use crate::config::Config;
use crate::engine::TradingEngine;
use crate::execution::{GatewaySet, LiveGateway, SimulatedGateway};
use crate::feed::{BinancePoller, PriceFeed, PriceHub};
use crate::notify::{Notifier, TracingNotifier, WebhookNotifier};
use crate::opportunity::Opportunity;
use crate::store::JsonFileStore;
use crate::trade::{Side, TradeMode};
use crate::vault::EnvVault;
use anyhow::Context;
use clap::Args;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// JSON-lines file of validated opportunities to submit after start-up
    #[arg(short, long)]
    pub opportunities: Option<PathBuf>,

    /// Enable real-mode trading through the live exchange gateway
    #[arg(long)]
    pub real: bool,
}

/// One line of the opportunities file
#[derive(Debug, Deserialize)]
struct OpportunityLine {
    symbol: String,
    direction: Side,
    confidence: Decimal,
    #[serde(default = "default_mode")]
    mode: TradeMode,
    #[serde(default)]
    payload: serde_json::Value,
}

fn default_mode() -> TradeMode {
    TradeMode::Paper
}

fn read_opportunities(path: &Path) -> anyhow::Result<Vec<Opportunity>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading opportunities from {}", path.display()))?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(n, line)| {
            let parsed: OpportunityLine = serde_json::from_str(line)
                .with_context(|| format!("opportunity line {}", n + 1))?;
            let mut opportunity =
                Opportunity::new(parsed.symbol, parsed.direction, parsed.confidence, parsed.mode);
            opportunity.payload = parsed.payload;
            Ok(opportunity)
        })
        .collect()
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let store = Arc::new(JsonFileStore::open(&config.persistence.dir).await?);
        let hub = Arc::new(PriceHub::new(chrono::Duration::seconds(
            config.feed.range_window_secs as i64,
        )));
        let notifier: Arc<dyn Notifier> = match &config.notify.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url)?),
            None => Arc::new(TracingNotifier),
        };

        let sim = Arc::new(SimulatedGateway::new(
            hub.clone(),
            config.execution.fee_rate,
            config.symbols.clone(),
        ));
        let mut gateways = GatewaySet::new(sim);
        if self.real {
            let live = LiveGateway::new(
                &config.execution,
                Arc::new(EnvVault::default()),
                config.symbols.clone(),
            )?;
            gateways = gateways.with_real(Arc::new(live));
            tracing::warn!(base_url = %config.execution.base_url, "Real-mode trading enabled");
        }

        let feed = BinancePoller::new(
            &config.feed.base_url,
            config.feed.symbols.clone(),
            std::time::Duration::from_millis(config.feed.poll_interval_ms),
            config.execution.request_timeout(),
        )?;
        let ticks = feed.subscribe().await?;
        let feed_task = tokio::spawn(hub.clone().run(ticks));

        let engine =
            TradingEngine::new(config, store, gateways, hub.clone(), notifier).await?;
        let resumed = engine.start().await?;
        tracing::info!(resumed, symbols = ?config.feed.symbols, "Engine running");

        if let Some(path) = &self.opportunities {
            // Give the feed a moment to deliver a first price
            tokio::time::sleep(std::time::Duration::from_millis(
                config.feed.poll_interval_ms * 2,
            ))
            .await;
            for mut opportunity in read_opportunities(path)? {
                match engine.accept_opportunity(&mut opportunity).await {
                    Ok(trade_id) => {
                        tracing::info!(%trade_id, symbol = %opportunity.symbol, "Trade opened")
                    }
                    Err(e) => tracing::warn!(
                        opportunity_id = %opportunity.id,
                        symbol = %opportunity.symbol,
                        error = %e,
                        "Opportunity not traded"
                    ),
                }
            }
        }

        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown requested");
        engine.shutdown().await;
        feed_task.abort();
        Ok(())
    }
}
