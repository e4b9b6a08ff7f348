//! Order gateway types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Internal order identifier
pub type OrderId = Uuid;

/// Order side as sent to the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Exchange wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Market order (immediate execution)
    Market,
    /// Stop leg of an exit pair
    StopLimit,
    /// Take-profit leg of an exit pair
    TakeProfitLimit,
    /// Combined order list as reported by the exchange
    Oco,
}

/// Order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Rejected,
    Canceled,
}

impl OrderStatus {
    /// Whether the order can still change on the exchange
    pub fn is_working(&self) -> bool {
        matches!(self, OrderStatus::New | OrderStatus::PartiallyFilled)
    }
}

/// One concrete order sent to a gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetails {
    /// Internal identifier
    pub id: OrderId,
    /// Exchange-assigned identifier, set once acknowledged
    pub exchange_id: Option<String>,
    /// Exchange-assigned order list id for OCO legs
    pub list_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub requested_qty: Decimal,
    pub executed_qty: Decimal,
    /// Limit or trigger price; `None` for market orders
    pub requested_price: Option<Decimal>,
    /// Average execution price once filled
    pub executed_price: Option<Decimal>,
    pub status: OrderStatus,
    /// Fees charged for this order, in quote currency
    pub fee: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl OrderDetails {
    /// Create a new, not yet acknowledged order
    pub fn new(
        symbol: impl Into<String>,
        side: OrderSide,
        order_type: OrderType,
        requested_qty: Decimal,
        requested_price: Option<Decimal>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            exchange_id: None,
            list_id: None,
            symbol: symbol.into(),
            side,
            order_type,
            requested_qty,
            executed_qty: Decimal::ZERO,
            requested_price,
            executed_price: None,
            status: OrderStatus::New,
            fee: Decimal::ZERO,
            timestamp: Utc::now(),
        }
    }

    /// Filled with a usable execution price
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled && self.executed_price.is_some()
    }
}

/// Market order request
#[derive(Debug, Clone)]
pub struct MarketOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
}

/// Exit pair request: a stop-limit leg and a take-profit leg that cancel each other
#[derive(Debug, Clone)]
pub struct OcoExitRequest {
    pub symbol: String,
    /// Side of the exit orders (opposite of the position)
    pub side: OrderSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub stop_price: Decimal,
    pub stop_limit_price: Decimal,
    pub take_profit_price: Decimal,
}

/// Linked stop / take-profit pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcoOrder {
    pub stop_leg: OrderDetails,
    pub take_profit_leg: OrderDetails,
}

impl OcoOrder {
    /// The filled leg, if any
    pub fn filled_leg(&self) -> Option<&OrderDetails> {
        [&self.stop_leg, &self.take_profit_leg]
            .into_iter()
            .find(|leg| leg.is_filled())
    }
}

/// Order gateway errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Network failure or rate limit; safe to retry
    #[error("Transient gateway error: {0}")]
    Transient(String),
    /// Request timed out; the exchange may still have accepted it
    #[error("Gateway request timed out")]
    Timeout,
    /// Exchange refused the order
    #[error("Order rejected by exchange: {reason}")]
    Rejected { code: Option<i64>, reason: String },
    /// Exchange does not know the order
    #[error("Order not found: {0}")]
    NotFound(String),
    /// No price available to fill against
    #[error("No market price for {0}")]
    NoPrice(String),
    /// Credentials unavailable for a signed request
    #[error("Credentials unavailable: {0}")]
    Credentials(String),
    /// Local monitoring was torn down while the call was in flight
    #[error("Gateway call cancelled")]
    Cancelled,
}

impl GatewayError {
    /// Errors worth retrying with backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_) | GatewayError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_order_is_unacknowledged() {
        let order = OrderDetails::new("BTCUSDT", OrderSide::Buy, OrderType::Market, dec!(1), None);
        assert!(order.exchange_id.is_none());
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.executed_qty, dec!(0));
        assert!(!order.is_filled());
    }

    #[test]
    fn test_filled_requires_price() {
        let mut order =
            OrderDetails::new("BTCUSDT", OrderSide::Sell, OrderType::Market, dec!(1), None);
        order.status = OrderStatus::Filled;
        assert!(!order.is_filled());

        order.executed_price = Some(dec!(100));
        assert!(order.is_filled());
    }

    #[test]
    fn test_oco_filled_leg() {
        let stop = OrderDetails::new(
            "BTCUSDT",
            OrderSide::Sell,
            OrderType::StopLimit,
            dec!(1),
            Some(dec!(95)),
        );
        let mut take_profit = OrderDetails::new(
            "BTCUSDT",
            OrderSide::Sell,
            OrderType::TakeProfitLimit,
            dec!(1),
            Some(dec!(110)),
        );
        let mut oco = OcoOrder {
            stop_leg: stop,
            take_profit_leg: take_profit.clone(),
        };
        assert!(oco.filled_leg().is_none());

        take_profit.status = OrderStatus::Filled;
        take_profit.executed_price = Some(dec!(110));
        oco.take_profit_leg = take_profit;
        assert_eq!(
            oco.filled_leg().map(|l| l.order_type),
            Some(OrderType::TakeProfitLimit)
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(GatewayError::Timeout.is_transient());
        assert!(GatewayError::Transient("429".into()).is_transient());
        assert!(!GatewayError::Rejected {
            code: Some(-2010),
            reason: "insufficient balance".into()
        }
        .is_transient());
        assert!(!GatewayError::NotFound("1".into()).is_transient());
    }

    #[test]
    fn test_order_side_wire_format() {
        assert_eq!(OrderSide::Buy.as_str(), "BUY");
        assert_eq!(OrderSide::Sell.as_str(), "SELL");
    }
}
