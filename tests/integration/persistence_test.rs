//! File-backed state across engine restarts

use crate::common::SYMBOL;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use trailguard::config::{Config, PersistenceConfig};
use trailguard::execution::{OrderDetails, OrderType};
use trailguard::feed::{PriceHub, PriceTick};
use trailguard::notify::TracingNotifier;
use trailguard::opportunity::Opportunity;
use trailguard::store::{JsonFileStore, TradeStore};
use trailguard::trade::{Side, Trade, TradeMode, TradeStatus, TrailingStop};
use trailguard::TradingEngine;

async fn file_engine(config: &Config) -> TradingEngine {
    let store = Arc::new(JsonFileStore::open(&config.persistence.dir).await.unwrap());
    let hub = Arc::new(PriceHub::new(chrono::Duration::minutes(10)));
    hub.publish(PriceTick::now(SYMBOL, dec!(100))).await;
    TradingEngine::simulated(config, store, hub, Arc::new(TracingNotifier))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_ledger_and_trades_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        persistence: PersistenceConfig {
            dir: dir.path().to_path_buf(),
        },
        ..Default::default()
    };

    let first = file_engine(&config).await;
    let mut opp = Opportunity::new(SYMBOL, Side::Long, dec!(0.9), TradeMode::Paper);
    let id = first.accept_opportunity(&mut opp).await.unwrap();
    first.shutdown().await;
    drop(first);

    let second = file_engine(&config).await;
    let ledger = second.get_ledger_status(TradeMode::Paper).await.unwrap();
    assert_eq!(ledger.committed, dec!(2500));
    assert_eq!(ledger.risked_today, dec!(2500));

    let open = second.get_open_trades(TradeMode::Paper).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, id);
    assert_eq!(open[0].stop_price(), Some(dec!(95)));
    assert_eq!(second.start().await.unwrap(), 1);
    second.shutdown().await;
}

fn status_strategy() -> impl Strategy<Value = TradeStatus> {
    prop_oneof![
        Just(TradeStatus::Opening),
        Just(TradeStatus::Open),
        Just(TradeStatus::Closing),
        Just(TradeStatus::Closed),
        Just(TradeStatus::Failed),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_trade_round_trips_through_file_store(
        status in status_strategy(),
        long in any::<bool>(),
        entry_cents in 1u64..10_000_000,
        qty_units in 1u64..1_000_000,
        needs_review in any::<bool>(),
    ) {
        let side = if long { Side::Long } else { Side::Short };
        let entry = Decimal::new(entry_cents as i64, 2);
        let quantity = Decimal::new(qty_units as i64, 4);
        let order = OrderDetails::new(SYMBOL, side.entry_order_side(), OrderType::Market, quantity, None);
        let mut trade = Trade::new(TradeMode::Paper, SYMBOL, side, uuid::Uuid::new_v4(), order, entry * quantity);
        trade.status = status;
        trade.entry_price = Some(entry);
        trade.needs_review = needs_review;
        trade.trailing = Some(TrailingStop {
            activation_price: entry,
            callback_rate: dec!(0.05),
            stop_price: entry * (Decimal::ONE - side.sign() * dec!(0.05)),
            high_water_price: entry,
            activated: true,
        });
        trade.annotate("generated");

        let dir = tempfile::tempdir().unwrap();
        let loaded = tokio_test::block_on(async {
            let store = JsonFileStore::open(dir.path()).await.unwrap();
            store.save_trade(&trade).await.unwrap();
            store.load_trade(trade.id).await.unwrap()
        });
        prop_assert_eq!(loaded, Some(trade));
    }
}
