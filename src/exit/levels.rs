//! Initial exit level strategies

use crate::config::{ExitConfig, ExitStrategyKind};
use crate::trade::Side;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Distances from entry, as fractions of the entry price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelOffsets {
    pub stop_pct: Decimal,
    pub take_profit_pct: Decimal,
    pub callback_rate: Decimal,
}

/// Produces the offsets used to place the initial exit pair
pub trait LevelStrategy: Send + Sync {
    /// Strategy name for logs
    fn name(&self) -> &'static str;

    /// Offsets for a new position; `realized_range` is the recent
    /// high-low range as a fraction of the last price, when known
    fn offsets(&self, realized_range: Option<Decimal>) -> LevelOffsets;
}

/// Fixed percentage distances
#[derive(Debug, Clone)]
pub struct FixedPercent {
    offsets: LevelOffsets,
}

impl FixedPercent {
    pub fn new(stop_pct: Decimal, take_profit_pct: Decimal, callback_rate: Decimal) -> Self {
        Self {
            offsets: LevelOffsets {
                stop_pct,
                take_profit_pct,
                callback_rate,
            },
        }
    }
}

impl LevelStrategy for FixedPercent {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn offsets(&self, _realized_range: Option<Decimal>) -> LevelOffsets {
        self.offsets
    }
}

/// Distances scaled by the symbol's recent realized range
///
/// Falls back to fixed distances until the feed has enough history.
#[derive(Debug, Clone)]
pub struct RealizedRange {
    stop_multiple: Decimal,
    take_profit_multiple: Decimal,
    fallback: FixedPercent,
}

const MIN_OFFSET: Decimal = dec!(0.001);
const MAX_OFFSET: Decimal = dec!(0.5);

impl RealizedRange {
    pub fn new(stop_multiple: Decimal, take_profit_multiple: Decimal, fallback: FixedPercent) -> Self {
        Self {
            stop_multiple,
            take_profit_multiple,
            fallback,
        }
    }
}

impl LevelStrategy for RealizedRange {
    fn name(&self) -> &'static str {
        "realized_range"
    }

    fn offsets(&self, realized_range: Option<Decimal>) -> LevelOffsets {
        match realized_range {
            Some(range) if range > Decimal::ZERO => {
                let stop_pct = (range * self.stop_multiple).clamp(MIN_OFFSET, MAX_OFFSET);
                LevelOffsets {
                    stop_pct,
                    take_profit_pct: (range * self.take_profit_multiple)
                        .clamp(MIN_OFFSET, MAX_OFFSET),
                    callback_rate: stop_pct,
                }
            }
            _ => self.fallback.offsets(None),
        }
    }
}

/// Exit prices for a freshly opened position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitLevels {
    pub stop_price: Decimal,
    pub stop_limit_price: Decimal,
    pub take_profit_price: Decimal,
    pub callback_rate: Decimal,
    pub activation_price: Decimal,
}

/// Turns an entry fill into exit levels
pub struct ExitCalculator {
    strategy: Box<dyn LevelStrategy>,
    stop_limit_offset_pct: Decimal,
    activation_pct: Decimal,
}

impl ExitCalculator {
    pub fn new(
        strategy: Box<dyn LevelStrategy>,
        stop_limit_offset_pct: Decimal,
        activation_pct: Decimal,
    ) -> Self {
        Self {
            strategy,
            stop_limit_offset_pct,
            activation_pct,
        }
    }

    pub fn from_config(config: &ExitConfig) -> Self {
        let fixed = FixedPercent::new(
            config.stop_pct,
            config.take_profit_pct,
            config.callback_rate,
        );
        let strategy: Box<dyn LevelStrategy> = match config.strategy {
            ExitStrategyKind::Fixed => Box::new(fixed),
            ExitStrategyKind::RealizedRange => Box::new(RealizedRange::new(
                config.range_stop_multiple,
                config.range_take_profit_multiple,
                fixed,
            )),
        };
        Self::new(strategy, config.stop_limit_offset_pct, config.activation_pct)
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Initial stop, stop-limit, take-profit and activation prices
    pub fn initial_levels(
        &self,
        entry_price: Decimal,
        side: Side,
        realized_range: Option<Decimal>,
    ) -> ExitLevels {
        let offsets = self.strategy.offsets(realized_range);
        let sign = side.sign();
        let stop_price = entry_price * (Decimal::ONE - sign * offsets.stop_pct);

        ExitLevels {
            stop_limit_price: self.stop_limit_price(stop_price, side),
            stop_price,
            take_profit_price: entry_price * (Decimal::ONE + sign * offsets.take_profit_pct),
            callback_rate: offsets.callback_rate,
            activation_price: entry_price * (Decimal::ONE + sign * self.activation_pct),
        }
    }

    /// Limit price for a stop leg, placed beyond the trigger so it fills
    pub fn stop_limit_price(&self, stop_price: Decimal, side: Side) -> Decimal {
        stop_price * (Decimal::ONE - side.sign() * self.stop_limit_offset_pct)
    }
}
