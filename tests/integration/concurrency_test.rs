//! Concurrent acceptance never overcommits a mode's ledger

use crate::common::{engine_with, test_config, SYMBOL};
use futures_util::future::join_all;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use trailguard::config::RiskConfig;
use trailguard::opportunity::Opportunity;
use trailguard::store::MemoryStore;
use trailguard::trade::{Side, TradeMode, TradeStatus};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_concurrent_accepts_respect_balance(
        submissions in 2usize..16,
        per_trade_pct in 5u32..=50,
        daily_pct in 50u32..=100,
        shorts in any::<bool>(),
    ) {
        let mut config = test_config();
        config.risk = RiskConfig {
            daily_capital_risk_pct: Decimal::new(daily_pct as i64, 2),
            per_trade_risk_pct: Decimal::new(per_trade_pct as i64, 2),
            ..Default::default()
        };
        let side = if shorts { Side::Short } else { Side::Long };

        let (accepted, committed, open_capital, balance, risked) = tokio_test::block_on(async {
            let t = engine_with(config.clone(), Arc::new(MemoryStore::new())).await;
            let attempts = (0..submissions).map(|_| {
                let engine = t.engine.clone();
                async move {
                    let mut opp = Opportunity::new(SYMBOL, side, dec!(0.9), TradeMode::Paper);
                    engine.accept_opportunity(&mut opp).await
                }
            });
            let results = join_all(attempts).await;
            let accepted = results.iter().filter(|r| r.is_ok()).count();

            let ledger = t.engine.get_ledger_status(TradeMode::Paper).await.unwrap();
            let open_capital: Decimal = t
                .store
                .all_trades()
                .await
                .iter()
                .filter(|trade| trade.status == TradeStatus::Open)
                .map(|trade| trade.capital_committed)
                .sum();
            t.engine.shutdown().await;
            (accepted, ledger.committed, open_capital, ledger.total_balance, ledger.risked_today)
        });

        prop_assert!(accepted >= 1);
        prop_assert!(open_capital <= balance);
        prop_assert_eq!(committed, open_capital);
        prop_assert!(risked <= config.risk.daily_capital_risk_pct * balance);
    }
}
