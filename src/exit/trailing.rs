//! Trailing-stop arithmetic
//!
//! A stop never loosens: for longs it only moves up, for shorts only down.

use crate::trade::Side;
use rust_decimal::Decimal;

/// Most favourable price seen so far
pub fn advance_extreme(high_water: Decimal, price: Decimal, side: Side) -> Decimal {
    match side {
        Side::Long => high_water.max(price),
        Side::Short => high_water.min(price),
    }
}

/// New stop price after observing `current_price`
///
/// Long: `max(current_stop, extreme × (1 − callback))`.
/// Short: `min(current_stop, extreme × (1 + callback))`.
pub fn recompute(
    current_stop: Decimal,
    high_water: Decimal,
    current_price: Decimal,
    side: Side,
    callback_rate: Decimal,
) -> Decimal {
    let extreme = advance_extreme(high_water, current_price, side);
    match side {
        Side::Long => current_stop.max(extreme * (Decimal::ONE - callback_rate)),
        Side::Short => current_stop.min(extreme * (Decimal::ONE + callback_rate)),
    }
}

/// Price has reached the stop
pub fn is_stop_hit(price: Decimal, stop: Decimal, side: Side) -> bool {
    match side {
        Side::Long => price <= stop,
        Side::Short => price >= stop,
    }
}

/// Price has reached the take-profit level
pub fn is_take_profit_hit(price: Decimal, take_profit: Decimal, side: Side) -> bool {
    match side {
        Side::Long => price >= take_profit,
        Side::Short => price <= take_profit,
    }
}
