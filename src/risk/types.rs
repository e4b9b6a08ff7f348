//! Risk management types

use rust_decimal::Decimal;
use thiserror::Error;

/// Sizing and capital reservation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RiskError {
    /// Per-trade or remaining daily budget is exhausted
    #[error("Insufficient risk budget: {available} available for this trade")]
    InsufficientRiskBudget { available: Decimal },
    /// Rounding to the lot step left nothing tradable
    #[error("Quantity {quantity} below exchange minimum {minimum}")]
    QuantityBelowMinimum { quantity: Decimal, minimum: Decimal },
    /// Committing the trade would exceed the mode's balance
    #[error("Insufficient capital: {required} required, {available} uncommitted")]
    InsufficientCapital {
        required: Decimal,
        available: Decimal,
    },
    /// Real-trade ceiling already reached
    #[error("Real trade ceiling of {ceiling} reached")]
    RealTradeCeilingReached { ceiling: u32 },
    /// Entry price unusable for sizing
    #[error("Invalid entry price: {0}")]
    InvalidPrice(Decimal),
}
