//! Acceptance scenarios for sizing, gating and trailing exits

use crate::common::{engine, engine_with, test_config, SYMBOL};
use rust_decimal_macros::dec;
use std::sync::Arc;
use trailguard::config::RiskConfig;
use trailguard::error::{EngineError, GateRejection};
use trailguard::opportunity::{Opportunity, OpportunityStatus};
use trailguard::store::MemoryStore;
use trailguard::trade::{ClosingReason, Side, TradeMode, TradeStatus};

#[tokio::test]
async fn test_scenario_a_sizing_against_daily_budget() {
    let t = engine().await;
    let mut opp = Opportunity::new(SYMBOL, Side::Long, dec!(0.9), TradeMode::Paper);

    let id = t.engine.accept_opportunity(&mut opp).await.unwrap();

    let trade = t.stored(id).await;
    assert_eq!(trade.status, TradeStatus::Open);
    assert!(trade.quantity <= dec!(25));
    assert_eq!(trade.quantity, dec!(25));
    assert_eq!(trade.entry_price, Some(dec!(100)));

    let ledger = t.engine.get_ledger_status(TradeMode::Paper).await.unwrap();
    assert_eq!(ledger.risked_today, dec!(2500));
    assert_eq!(ledger.committed, dec!(2500));
    assert_eq!(ledger.total_balance, dec!(10000));
    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_scenario_b_real_confidence_gate() {
    let t = engine().await;
    let mut opp = Opportunity::new(SYMBOL, Side::Long, dec!(0.83), TradeMode::Real);

    let err = t.engine.accept_opportunity(&mut opp).await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::GateRejected(GateRejection::ConfidenceBelowThreshold { .. })
    ));
    assert_eq!(opp.status, OpportunityStatus::Rejected);
    assert_eq!(
        opp.reject_reason.as_deref(),
        Some("confidence 83% below 95% threshold for real trading")
    );
    assert!(t.store.all_trades().await.is_empty());
    let ledger = t.engine.get_ledger_status(TradeMode::Real).await.unwrap();
    assert_eq!(ledger.committed, dec!(0));
    assert_eq!(ledger.real_trades_opened, 0);
}

#[tokio::test]
async fn test_scenario_c_trailing_stop_exit() {
    let t = engine().await;
    let mut opp = Opportunity::new(SYMBOL, Side::Long, dec!(0.9), TradeMode::Paper);
    let id = t.engine.accept_opportunity(&mut opp).await.unwrap();
    assert_eq!(t.stored(id).await.stop_price(), Some(dec!(95)));
    t.await_watcher().await;

    t.price(dec!(110)).await;
    let trailed = t
        .await_trade(id, |trade| trade.stop_price() == Some(dec!(104.5)))
        .await;
    assert_eq!(trailed.status, TradeStatus::Open);
    let coverage = trailed.exit_coverage.as_ref().unwrap();
    assert_eq!(coverage.stop_leg.requested_price, Some(dec!(104.3955)));

    t.price(dec!(104.4)).await;
    let closed = t
        .await_trade(id, |trade| trade.status == TradeStatus::Closed)
        .await;

    assert_eq!(closed.closing_reason, Some(ClosingReason::TrailingStop));
    let exit = closed.exit_orders.iter().find(|o| o.is_filled()).unwrap();
    let exit_price = exit.executed_price.unwrap();
    assert!((exit_price - dec!(104.5)).abs() <= dec!(0.2));
    assert!(closed.realized_pnl.unwrap() > dec!(0));

    t.engine.shutdown().await;
    let ledger = t.engine.get_ledger_status(TradeMode::Paper).await.unwrap();
    assert_eq!(ledger.committed, dec!(0));
    assert_eq!(ledger.total_balance, dec!(10000) + closed.realized_pnl.unwrap());
}

#[tokio::test]
async fn test_scenario_d_real_trade_ceiling() {
    let mut config = test_config();
    config.risk = RiskConfig {
        per_trade_risk_pct: dec!(0.05),
        ..Default::default()
    };
    let t = engine_with(config, Arc::new(MemoryStore::new())).await;

    for _ in 0..5 {
        let mut opp = Opportunity::new(SYMBOL, Side::Long, dec!(0.99), TradeMode::Real);
        t.engine.accept_opportunity(&mut opp).await.unwrap();
    }

    for confidence in [dec!(0.99), dec!(1)] {
        let mut sixth = Opportunity::new(SYMBOL, Side::Long, confidence, TradeMode::Real);
        let err = t.engine.accept_opportunity(&mut sixth).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::GateRejected(GateRejection::RealTradeCeiling { ceiling: 5 })
        ));
        assert_eq!(sixth.status, OpportunityStatus::Rejected);
    }

    let ledger = t.engine.get_ledger_status(TradeMode::Real).await.unwrap();
    assert_eq!(ledger.real_trades_opened, 5);
    assert_eq!(t.engine.get_open_trades(TradeMode::Real).await.unwrap().len(), 5);
    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_ceiling_counts_closed_real_trades() {
    let mut config = test_config();
    config.risk = RiskConfig {
        per_trade_risk_pct: dec!(0.05),
        real_trade_ceiling: 1,
        ..Default::default()
    };
    let t = engine_with(config, Arc::new(MemoryStore::new())).await;

    let mut first = Opportunity::new(SYMBOL, Side::Long, dec!(0.99), TradeMode::Real);
    let id = t.engine.accept_opportunity(&mut first).await.unwrap();
    t.engine.force_close(id, "done").await.unwrap();

    let mut second = Opportunity::new(SYMBOL, Side::Long, dec!(0.99), TradeMode::Real);
    let err = t.engine.accept_opportunity(&mut second).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::GateRejected(GateRejection::RealTradeCeiling { ceiling: 1 })
    ));
    let ledger = t.engine.get_ledger_status(TradeMode::Real).await.unwrap();
    assert_eq!(ledger.real_trades_closed, 1);
    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_take_profit_exit() {
    let t = engine().await;
    let mut opp = Opportunity::new(SYMBOL, Side::Short, dec!(0.9), TradeMode::Paper);
    let id = t.engine.accept_opportunity(&mut opp).await.unwrap();
    assert_eq!(t.stored(id).await.take_profit_price, Some(dec!(80)));
    t.await_watcher().await;

    t.price(dec!(79)).await;
    let closed = t
        .await_trade(id, |trade| trade.status == TradeStatus::Closed)
        .await;
    assert_eq!(closed.closing_reason, Some(ClosingReason::TakeProfit));
    assert!(closed.realized_pnl.unwrap() > dec!(0));
    t.engine.shutdown().await;
}
