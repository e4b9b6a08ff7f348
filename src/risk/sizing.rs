//! Position sizing
//!
//! Capital for a trade is the smaller of the per-trade allowance and what is
//! left of the daily risk budget; quantity is that capital divided by the
//! entry price, rounded down to the exchange lot step.

use super::RiskError;
use crate::config::{RiskConfig, SymbolRules};
use rust_decimal::Decimal;

/// Result of sizing a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizedPosition {
    /// Order quantity, a multiple of the lot step
    pub quantity: Decimal,
    /// Cost of the quantity at the entry price
    pub capital: Decimal,
    /// Capital the budget allowed before lot rounding
    pub budget: Decimal,
}

/// Round `quantity` down to a multiple of `step`
pub fn round_to_step(quantity: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return quantity;
    }
    ((quantity / step).floor() * step).normalize()
}

/// Capital available for one trade
pub fn trade_budget(balance: Decimal, daily_risk_used: Decimal, risk: &RiskConfig) -> Decimal {
    let per_trade = risk.per_trade_risk_pct * balance;
    let daily_remaining = risk.daily_capital_risk_pct * balance - daily_risk_used;
    per_trade.min(daily_remaining)
}

/// Compute the order quantity for a trade
///
/// Pure: no clock, no I/O. `rules` carries the symbol's lot step and minimum.
pub fn compute_quantity(
    balance: Decimal,
    daily_risk_used: Decimal,
    risk: &RiskConfig,
    entry_price: Decimal,
    rules: &SymbolRules,
) -> Result<SizedPosition, RiskError> {
    if entry_price <= Decimal::ZERO {
        return Err(RiskError::InvalidPrice(entry_price));
    }

    let budget = trade_budget(balance, daily_risk_used, risk);
    if budget <= Decimal::ZERO {
        return Err(RiskError::InsufficientRiskBudget {
            available: budget.max(Decimal::ZERO),
        });
    }

    let quantity = round_to_step(budget / entry_price, rules.lot_step);
    if quantity <= Decimal::ZERO || quantity < rules.min_qty {
        return Err(RiskError::QuantityBelowMinimum {
            quantity,
            minimum: rules.min_qty.max(rules.lot_step),
        });
    }

    Ok(SizedPosition {
        quantity,
        capital: quantity * entry_price,
        budget,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn rules(step: Decimal) -> SymbolRules {
        SymbolRules {
            lot_step: step,
            min_qty: step,
            slippage_bps: dec!(0),
            tick_size: dec!(0.01),
        }
    }

    #[test]
    fn test_paper_scenario_quarter_of_balance() {
        let risk = RiskConfig::default();
        let sized =
            compute_quantity(dec!(10000), dec!(0), &risk, dec!(100), &rules(dec!(0.001))).unwrap();

        // 25% of 10,000 at 100 per unit
        assert_eq!(sized.quantity, dec!(25));
        assert_eq!(sized.capital, dec!(2500));
        assert_eq!(sized.budget, dec!(2500));
    }

    #[test]
    fn test_daily_budget_caps_trade() {
        let risk = RiskConfig::default();
        // 4,000 of the 5,000 daily budget already used
        let sized =
            compute_quantity(dec!(10000), dec!(4000), &risk, dec!(100), &rules(dec!(1))).unwrap();
        assert_eq!(sized.quantity, dec!(10));
        assert_eq!(sized.budget, dec!(1000));
    }

    #[test]
    fn test_exhausted_daily_budget() {
        let risk = RiskConfig::default();
        let result = compute_quantity(dec!(10000), dec!(5000), &risk, dec!(100), &rules(dec!(1)));
        assert_eq!(
            result,
            Err(RiskError::InsufficientRiskBudget {
                available: dec!(0)
            })
        );
    }

    #[test]
    fn test_rounding_to_zero() {
        let risk = RiskConfig::default();
        // 2,500 budget buys 0.025 of a 100,000 asset; step 0.1 rounds to zero
        let result = compute_quantity(
            dec!(10000),
            dec!(0),
            &risk,
            dec!(100000),
            &rules(dec!(0.1)),
        );
        assert!(matches!(
            result,
            Err(RiskError::QuantityBelowMinimum { .. })
        ));
    }

    #[test]
    fn test_below_min_qty() {
        let risk = RiskConfig::default();
        let symbol = SymbolRules {
            lot_step: dec!(0.001),
            min_qty: dec!(1),
            slippage_bps: dec!(0),
            tick_size: dec!(0.01),
        };
        let result = compute_quantity(dec!(1000), dec!(0), &risk, dec!(500), &symbol);
        assert_eq!(
            result,
            Err(RiskError::QuantityBelowMinimum {
                quantity: dec!(0.5),
                minimum: dec!(1)
            })
        );
    }

    #[test]
    fn test_invalid_price() {
        let risk = RiskConfig::default();
        let result = compute_quantity(dec!(1000), dec!(0), &risk, dec!(0), &rules(dec!(1)));
        assert_eq!(result, Err(RiskError::InvalidPrice(dec!(0))));
    }

    #[test]
    fn test_round_to_step() {
        assert_eq!(round_to_step(dec!(1.23456), dec!(0.001)), dec!(1.234));
        assert_eq!(round_to_step(dec!(7.9), dec!(1)), dec!(7));
        assert_eq!(round_to_step(dec!(0.5), dec!(0)), dec!(0.5));
    }

    proptest! {
        #[test]
        fn prop_cost_never_exceeds_budget(
            balance in 1u64..10_000_000,
            used_pct in 0u32..=100,
            price_cents in 1u64..10_000_000,
            step_exp in 0u32..6,
        ) {
            let risk = RiskConfig::default();
            let balance = Decimal::from(balance);
            let daily_cap = risk.daily_capital_risk_pct * balance;
            let used = daily_cap * Decimal::from(used_pct) / dec!(100);
            let price = Decimal::new(price_cents as i64, 2);
            let step = Decimal::new(1, step_exp);

            if let Ok(sized) = compute_quantity(balance, used, &risk, price, &rules(step)) {
                let limit = (risk.per_trade_risk_pct * balance).min(daily_cap - used);
                prop_assert!(sized.capital <= limit);
                prop_assert!(sized.quantity > Decimal::ZERO);
                prop_assert_eq!(round_to_step(sized.quantity, step), sized.quantity);
            }
        }
    }
}
