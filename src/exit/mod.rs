//! Exit strategy module
//!
//! Initial stop / take-profit levels and trailing-stop recomputation

mod levels;
mod trailing;

pub use levels::{
    ExitCalculator, ExitLevels, FixedPercent, LevelOffsets, LevelStrategy, RealizedRange,
};
pub use trailing::{advance_extreme, is_stop_hit, is_take_profit_hit, recompute};
