//! Trade aggregate and lifecycle

mod machine;
mod types;

pub use machine::{StopSignal, TickOutcome, TradeStateMachine};
pub use types::{ClosingReason, Side, Trade, TradeId, TradeMode, TradeStatus, TrailingStop};
