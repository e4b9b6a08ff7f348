//! Trade aggregate types

use crate::execution::{OcoOrder, OrderDetails, OrderSide};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Trade identifier
pub type TradeId = Uuid;

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Long => Decimal::ONE,
            Side::Short => Decimal::NEGATIVE_ONE,
        }
    }

    /// Order side that opens the position
    pub fn entry_order_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that flattens the position
    pub fn exit_order_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }
}

/// Trading mode: simulated capital or real capital
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    Paper,
    Real,
}

impl TradeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeMode::Paper => "paper",
            TradeMode::Real => "real",
        }
    }
}

impl fmt::Display for TradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Opening,
    Open,
    Closing,
    Closed,
    Failed,
}

impl TradeStatus {
    /// Needs a watcher
    pub fn is_active(&self) -> bool {
        matches!(self, TradeStatus::Open | TradeStatus::Closing)
    }

    /// No further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, TradeStatus::Closed | TradeStatus::Failed)
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TradeStatus::Opening => "opening",
            TradeStatus::Open => "open",
            TradeStatus::Closing => "closing",
            TradeStatus::Closed => "closed",
            TradeStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why a trade was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosingReason {
    TakeProfit,
    TrailingStop,
    Manual,
    Error,
}

/// Trailing-stop state carried by every open trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingStop {
    /// Price the market must reach before the stop starts trailing
    pub activation_price: Decimal,
    /// Callback distance as a fraction of the favourable extreme
    pub callback_rate: Decimal,
    /// Current stop trigger price
    pub stop_price: Decimal,
    /// Best price seen since entry (highest for long, lowest for short)
    pub high_water_price: Decimal,
    /// Whether the activation price has been reached
    pub activated: bool,
}

/// The central trade aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub mode: TradeMode,
    pub symbol: String,
    pub side: Side,
    pub opportunity_id: Uuid,
    pub status: TradeStatus,
    pub entry_order: OrderDetails,
    /// Currently working exchange-side exit pair, if any
    pub exit_coverage: Option<OcoOrder>,
    /// Every exit order that reached a final state
    pub exit_orders: Vec<OrderDetails>,
    /// Filled entry quantity
    pub quantity: Decimal,
    /// Filled entry price
    pub entry_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
    pub trailing: Option<TrailingStop>,
    /// Capital reserved in the ledger for this trade
    pub capital_committed: Decimal,
    /// Amount the ledger actually holds for this trade; released on settle
    #[serde(default)]
    pub ledger_committed: Decimal,
    pub realized_pnl: Option<Decimal>,
    pub realized_pnl_pct: Option<Decimal>,
    pub closing_reason: Option<ClosingReason>,
    pub failure_reason: Option<String>,
    /// Set when an operator has to look at the position
    pub needs_review: bool,
    /// Free-form audit notes; the only field that may change after close
    pub annotations: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Trade {
    /// Create a trade in `opening` state around its entry order
    pub fn new(
        mode: TradeMode,
        symbol: impl Into<String>,
        side: Side,
        opportunity_id: Uuid,
        entry_order: OrderDetails,
        capital_committed: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            symbol: symbol.into(),
            side,
            opportunity_id,
            status: TradeStatus::Opening,
            quantity: entry_order.requested_qty,
            entry_order,
            exit_coverage: None,
            exit_orders: vec![],
            entry_price: None,
            take_profit_price: None,
            trailing: None,
            capital_committed,
            ledger_committed: capital_committed,
            realized_pnl: None,
            realized_pnl_pct: None,
            closing_reason: None,
            failure_reason: None,
            needs_review: false,
            annotations: vec![],
            created_at: Utc::now(),
            opened_at: None,
            closed_at: None,
        }
    }

    /// Current stop price, if trailing state exists
    pub fn stop_price(&self) -> Option<Decimal> {
        self.trailing.as_ref().map(|t| t.stop_price)
    }

    /// Failed after entry without any exit filling: the position is still held
    pub fn position_left_open(&self) -> bool {
        self.status == TradeStatus::Failed
            && self.entry_price.is_some()
            && !self.exit_orders.iter().any(|o| o.is_filled())
    }

    /// Append an audit note
    pub fn annotate(&mut self, note: impl Into<String>) {
        self.annotations
            .push(format!("{} {}", Utc::now().to_rfc3339(), note.into()));
    }

    /// Unrealized P&L at `price`, before fees
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        match self.entry_price {
            Some(entry) => (price - entry) * self.quantity * self.side.sign(),
            None => Decimal::ZERO,
        }
    }
}
