//! Tick debouncing for trailing recomputation

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::{Duration, Instant};

/// Lets a tick through when price moved far enough or enough time passed
/// since the last tick that was let through
#[derive(Debug, Clone)]
pub struct Debounce {
    min_move: Decimal,
    min_interval: Duration,
    last: Option<(Decimal, Instant)>,
}

impl Debounce {
    pub fn new(min_move_bps: Decimal, min_interval: Duration) -> Self {
        Self {
            min_move: min_move_bps / dec!(10000),
            min_interval,
            last: None,
        }
    }

    pub fn should_evaluate(&mut self, price: Decimal, now: Instant) -> bool {
        let pass = match self.last {
            None => true,
            Some((last_price, last_at)) => {
                let moved = !last_price.is_zero()
                    && ((price - last_price).abs() / last_price) >= self.min_move;
                moved || now.duration_since(last_at) >= self.min_interval
            }
        };
        if pass {
            self.last = Some((price, now));
        }
        pass
    }
}
