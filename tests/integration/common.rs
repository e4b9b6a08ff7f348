//! Shared engine fixtures

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use trailguard::config::{Config, ExitConfig, LedgerConfig, MonitorConfig};
use trailguard::execution::{GatewaySet, SimulatedGateway};
use trailguard::feed::{PriceHub, PriceTick};
use trailguard::notify::{ChannelNotifier, Notification};
use trailguard::store::{MemoryStore, TradeStore};
use trailguard::trade::{Trade, TradeId};
use trailguard::TradingEngine;

pub const SYMBOL: &str = "BTCUSDT";

pub struct TestEngine {
    pub engine: Arc<TradingEngine>,
    pub hub: Arc<PriceHub>,
    pub store: Arc<MemoryStore>,
    pub alerts: UnboundedReceiver<Notification>,
}

/// Config tuned for tests: every tick is evaluated, take-profit out of the way
pub fn test_config() -> Config {
    Config {
        ledger: LedgerConfig {
            paper_balance: dec!(10000),
            real_balance: dec!(10000),
        },
        exit: ExitConfig {
            take_profit_pct: dec!(0.20),
            ..Default::default()
        },
        monitor: MonitorConfig {
            min_move_bps: dec!(0),
            min_interval_ms: 0,
            restart_backoff_ms: 1,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Engine with simulated paper and real gateways over `store`
pub async fn engine_with(config: Config, store: Arc<MemoryStore>) -> TestEngine {
    let hub = Arc::new(PriceHub::new(chrono::Duration::minutes(10)));
    hub.publish(PriceTick::now(SYMBOL, dec!(100))).await;

    let paper = Arc::new(SimulatedGateway::new(
        hub.clone(),
        config.execution.fee_rate,
        HashMap::new(),
    ));
    let real = Arc::new(SimulatedGateway::new(
        hub.clone(),
        config.execution.fee_rate,
        HashMap::new(),
    ));
    let gateways = GatewaySet::new(paper).with_real(real);

    let (notifier, alerts) = ChannelNotifier::new();
    let engine = TradingEngine::new(&config, store.clone(), gateways, hub.clone(), Arc::new(notifier))
        .await
        .unwrap();

    TestEngine {
        engine: Arc::new(engine),
        hub,
        store,
        alerts,
    }
}

pub async fn engine() -> TestEngine {
    engine_with(test_config(), Arc::new(MemoryStore::new())).await
}

impl TestEngine {
    pub async fn price(&self, price: Decimal) {
        self.hub.publish(PriceTick::now(SYMBOL, price)).await;
    }

    pub async fn stored(&self, id: TradeId) -> Trade {
        self.store.load_trade(id).await.unwrap().unwrap()
    }

    /// Wait for a watcher to subscribe to the feed
    pub async fn await_watcher(&self) {
        let hub = &self.hub;
        eventually(|| async move { hub.subscriber_count(SYMBOL).await > 0 }).await;
    }

    /// Wait until the stored trade satisfies `check`
    pub async fn await_trade(&self, id: TradeId, check: impl Fn(&Trade) -> bool) -> Trade {
        let mut last = self.stored(id).await;
        for _ in 0..400 {
            if check(&last) {
                return last;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            last = self.stored(id).await;
        }
        panic!("trade {id} never reached the expected state: {last:?}");
    }

    pub fn drain_alerts(&mut self) -> Vec<Notification> {
        let mut out = vec![];
        while let Ok(n) = self.alerts.try_recv() {
            out.push(n);
        }
        out
    }
}

/// Poll `condition` until it holds, failing after two seconds
pub async fn eventually<F, Fut>(condition: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}
