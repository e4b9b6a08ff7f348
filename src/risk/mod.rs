//! Risk management module
//!
//! Position sizing and the per-mode capital ledger

mod ledger;
mod sizing;
mod types;

pub use ledger::{CapitalLedger, DayBoundary, LedgerSnapshot, Reservation};
pub use sizing::{compute_quantity, round_to_step, trade_budget, SizedPosition};
pub use types::RiskError;
