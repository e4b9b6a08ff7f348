//! Restart, manual override and storage failure behaviour

use crate::common::{engine, engine_with, test_config, SYMBOL};
use rust_decimal_macros::dec;
use std::sync::Arc;
use trailguard::error::EngineError;
use trailguard::notify::{EventType, Severity};
use trailguard::opportunity::{Opportunity, OpportunityStatus};
use trailguard::store::MemoryStore;
use trailguard::trade::{ClosingReason, Side, TradeMode, TradeStatus};

#[tokio::test]
async fn test_restart_resumes_monitoring_without_reentry() {
    let store = Arc::new(MemoryStore::new());
    let first = engine_with(test_config(), store.clone()).await;
    let mut opp = Opportunity::new(SYMBOL, Side::Long, dec!(0.9), TradeMode::Paper);
    let id = first.engine.accept_opportunity(&mut opp).await.unwrap();
    first.await_watcher().await;
    first.price(dec!(110)).await;
    first
        .await_trade(id, |trade| trade.stop_price() == Some(dec!(104.5)))
        .await;
    first.engine.shutdown().await;

    let second = engine_with(test_config(), store.clone()).await;
    assert_eq!(second.engine.start().await.unwrap(), 1);
    assert!(second.engine.monitor().is_watching(id).await);
    assert_eq!(store.all_trades().await.len(), 1);

    // Trailing state came back from storage, not from entry
    second.await_watcher().await;
    second.price(dec!(104.4)).await;
    let closed = second
        .await_trade(id, |trade| trade.status == TradeStatus::Closed)
        .await;
    assert_eq!(closed.closing_reason, Some(ClosingReason::TrailingStop));

    let ledger = second.engine.get_ledger_status(TradeMode::Paper).await.unwrap();
    assert_eq!(ledger.committed, dec!(0));
    second.engine.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_keeps_positions_open() {
    let t = engine().await;
    let mut opp = Opportunity::new(SYMBOL, Side::Long, dec!(0.9), TradeMode::Paper);
    let id = t.engine.accept_opportunity(&mut opp).await.unwrap();

    t.engine.shutdown().await;

    let trade = t.stored(id).await;
    assert_eq!(trade.status, TradeStatus::Open);
    assert!(trade.exit_coverage.is_some());
    assert!(t.engine.monitor().watched().await.is_empty());
}

#[tokio::test]
async fn test_force_close_flattens_position() {
    let t = engine().await;
    let mut opp = Opportunity::new(SYMBOL, Side::Long, dec!(0.9), TradeMode::Paper);
    let id = t.engine.accept_opportunity(&mut opp).await.unwrap();

    let closed = t.engine.force_close(id, "emergency flatten").await.unwrap();

    assert_eq!(closed.status, TradeStatus::Closed);
    assert_eq!(closed.closing_reason, Some(ClosingReason::Manual));
    assert!(closed
        .annotations
        .iter()
        .any(|note| note.ends_with("force close: emergency flatten")));
    // Flat market: the round trip costs exactly the two fees
    assert_eq!(closed.realized_pnl, Some(dec!(-5)));

    let ledger = t.engine.get_ledger_status(TradeMode::Paper).await.unwrap();
    assert_eq!(ledger.committed, dec!(0));
    assert_eq!(ledger.total_balance, dec!(9995));
    assert!(t.engine.get_open_trades(TradeMode::Paper).await.unwrap().is_empty());

    let err = t.engine.force_close(id, "again").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_storage_outage_rejects_without_side_effects() {
    let t = engine().await;
    t.store.set_fail_writes(true);

    let mut opp = Opportunity::new(SYMBOL, Side::Long, dec!(0.9), TradeMode::Paper);
    let err = t.engine.accept_opportunity(&mut opp).await.unwrap_err();

    assert!(matches!(err, EngineError::Persistence(_)));
    assert_eq!(opp.status, OpportunityStatus::Rejected);
    assert!(t.store.all_trades().await.is_empty());
    let ledger = t.engine.get_ledger_status(TradeMode::Paper).await.unwrap();
    assert_eq!(ledger.committed, dec!(0));
    assert_eq!(ledger.risked_today, dec!(0));
}

#[tokio::test]
async fn test_failed_close_leaves_trade_open() {
    let t = engine().await;
    let mut opp = Opportunity::new(SYMBOL, Side::Long, dec!(0.9), TradeMode::Paper);
    let id = t.engine.accept_opportunity(&mut opp).await.unwrap();

    t.store.set_fail_writes(true);
    let err = t.engine.force_close(id, "flatten").await.unwrap_err();
    assert!(matches!(err, EngineError::Persistence(_)));
    assert_eq!(t.stored(id).await.status, TradeStatus::Open);

    t.store.set_fail_writes(false);
    let closed = t.engine.force_close(id, "flatten").await.unwrap();
    assert_eq!(closed.status, TradeStatus::Closed);
    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_unsettled_close_completes_after_restart() {
    let store = Arc::new(MemoryStore::new());
    let first = engine_with(test_config(), store.clone()).await;
    let mut opp = Opportunity::new(SYMBOL, Side::Long, dec!(0.9), TradeMode::Paper);
    let id = first.engine.accept_opportunity(&mut opp).await.unwrap();

    store.set_fail_ledger_writes(true);
    let err = first.engine.force_close(id, "flatten").await.unwrap_err();
    assert!(matches!(err, EngineError::Persistence(_)));
    first.engine.shutdown().await;

    let pending = first.stored(id).await;
    assert_eq!(pending.status, TradeStatus::Closing);
    assert!(pending.exit_orders.iter().any(|o| o.is_filled()));

    store.set_fail_ledger_writes(false);
    let second = engine_with(test_config(), store.clone()).await;
    assert_eq!(second.engine.start().await.unwrap(), 1);
    let closed = second
        .await_trade(id, |trade| trade.status == TradeStatus::Closed)
        .await;
    assert_eq!(closed.realized_pnl, Some(dec!(-5)));

    let ledger = second.engine.get_ledger_status(TradeMode::Paper).await.unwrap();
    assert_eq!(ledger.committed, dec!(0));
    assert_eq!(ledger.total_balance, dec!(9995));
    second.engine.shutdown().await;
}

#[tokio::test]
async fn test_crashed_watcher_is_restarted() {
    let mut t = engine().await;
    let mut opp = Opportunity::new(SYMBOL, Side::Long, dec!(0.9), TradeMode::Paper);
    let id = t.engine.accept_opportunity(&mut opp).await.unwrap();
    t.await_watcher().await;

    t.store.set_fail_writes(true);
    t.price(dec!(110)).await;
    let mut restarted = false;
    for _ in 0..200 {
        if t
            .drain_alerts()
            .iter()
            .any(|n| n.event_type == EventType::WatcherRestarted && n.severity == Severity::Warning)
        {
            restarted = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert!(restarted);
    t.store.set_fail_writes(false);

    assert!(t.engine.monitor().is_watching(id).await);
    assert_eq!(t.stored(id).await.stop_price(), Some(dec!(95)));
    t.await_watcher().await;
    t.price(dec!(110)).await;
    t.await_trade(id, |trade| trade.stop_price() == Some(dec!(104.5)))
        .await;
    t.engine.shutdown().await;
}
