//! Engine error taxonomy

use crate::execution::GatewayError;
use crate::opportunity::OpportunityStatus;
use crate::risk::RiskError;
use crate::store::StoreError;
use crate::trade::{TradeId, TradeMode, TradeStatus};
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// Why the coordinator refused an opportunity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateRejection {
    /// Opportunity was already processed
    NotPending(OpportunityStatus),
    /// Confidence did not exceed the mode's threshold
    ConfidenceBelowThreshold {
        confidence: Decimal,
        threshold: Decimal,
        mode: TradeMode,
    },
    /// Real-trade ceiling reached
    RealTradeCeiling { ceiling: u32 },
    /// Exchange connectivity or credential check failed
    ExchangeUnreachable(String),
    /// No order gateway configured for the mode
    ModeUnavailable(TradeMode),
    /// No current price to size the entry against
    NoMarketPrice(String),
}

impl GateRejection {
    /// Stable reason code for storage and metrics
    pub fn code(&self) -> &'static str {
        match self {
            GateRejection::NotPending(_) => "not_pending",
            GateRejection::ConfidenceBelowThreshold { .. } => "confidence_below_threshold",
            GateRejection::RealTradeCeiling { .. } => "real_trade_ceiling",
            GateRejection::ExchangeUnreachable(_) => "exchange_unreachable",
            GateRejection::ModeUnavailable(_) => "mode_unavailable",
            GateRejection::NoMarketPrice(_) => "no_market_price",
        }
    }
}

fn as_percent(value: Decimal) -> Decimal {
    (value * Decimal::ONE_HUNDRED).round_dp(2).normalize()
}

impl fmt::Display for GateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateRejection::NotPending(status) => {
                write!(f, "opportunity is {status:?}, not pending")
            }
            GateRejection::ConfidenceBelowThreshold {
                confidence,
                threshold,
                mode,
            } => write!(
                f,
                "confidence {}% below {}% threshold for {} trading",
                as_percent(*confidence),
                as_percent(*threshold),
                mode
            ),
            GateRejection::RealTradeCeiling { ceiling } => {
                write!(f, "real trade ceiling of {ceiling} trades reached")
            }
            GateRejection::ExchangeUnreachable(reason) => {
                write!(f, "exchange unreachable: {reason}")
            }
            GateRejection::ModeUnavailable(mode) => {
                write!(f, "{mode} trading is not configured")
            }
            GateRejection::NoMarketPrice(symbol) => {
                write!(f, "no current market price for {symbol}")
            }
        }
    }
}

/// Errors surfaced by the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Expected flow control: a gate check failed
    #[error("Opportunity rejected: {0}")]
    GateRejected(GateRejection),

    /// Sizing or capital reservation failed
    #[error(transparent)]
    Risk(#[from] RiskError),

    /// Order gateway failure
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// A transition could not be persisted; in-memory state was not advanced
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    /// Price feed silent beyond the staleness threshold
    #[error("Stale price data for {symbol}: no update for {silent_secs}s")]
    StaleData { symbol: String, silent_secs: u64 },

    #[error("Trade not found: {0}")]
    TradeNotFound(TradeId),

    #[error("Cannot {action} trade {id} in {status} state")]
    InvalidTransition {
        id: TradeId,
        status: TradeStatus,
        action: &'static str,
    },

    /// Exit could not be confirmed; position left open for manual review
    #[error("Exit not confirmed for trade {id}: {reason}")]
    ExitUnconfirmed { id: TradeId, reason: String },
}
