//! Simulation gateway with fills against the local price hub

use super::{
    GatewayError, MarketOrderRequest, OcoExitRequest, OcoOrder, OrderDetails, OrderGateway,
    OrderId, OrderSide, OrderStatus, OrderType,
};
use crate::config::SymbolRules;
use crate::feed::PriceHub;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

const BPS: Decimal = dec!(10000);

/// How long filled and canceled orders stay queryable
const TERMINAL_RETENTION_HOURS: i64 = 24;

struct SimOrder {
    details: OrderDetails,
    /// Stop trigger for stop legs
    trigger: Option<Decimal>,
    sibling: Option<OrderId>,
}

/// Paper-trading gateway
///
/// Market orders fill immediately at the hub's last price with the symbol's
/// slippage applied. Exit pairs are evaluated against the last price each
/// time their status is queried.
pub struct SimulatedGateway {
    hub: Arc<PriceHub>,
    fee_rate: Decimal,
    symbols: HashMap<String, SymbolRules>,
    orders: RwLock<HashMap<OrderId, SimOrder>>,
    /// Errors returned by the next calls, in order
    faults: Mutex<VecDeque<GatewayError>>,
    sequence: AtomicU64,
    retention: chrono::Duration,
}

impl SimulatedGateway {
    pub fn new(
        hub: Arc<PriceHub>,
        fee_rate: Decimal,
        symbols: HashMap<String, SymbolRules>,
    ) -> Self {
        Self {
            hub,
            fee_rate,
            symbols,
            orders: RwLock::new(HashMap::new()),
            faults: Mutex::new(VecDeque::new()),
            sequence: AtomicU64::new(1),
            retention: chrono::Duration::hours(TERMINAL_RETENTION_HOURS),
        }
    }

    /// Keep filled and canceled orders for `retention` before forgetting them
    pub fn with_retention(mut self, retention: chrono::Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Make the next gateway call fail with `error`
    pub async fn inject_fault(&self, error: GatewayError) {
        self.faults.lock().await.push_back(error);
    }

    /// Number of orders still tracked
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Forget terminal orders past the retention window; working orders stay
    fn evict_terminal(&self, orders: &mut HashMap<OrderId, SimOrder>) {
        let cutoff = Utc::now() - self.retention;
        let before = orders.len();
        orders.retain(|_, sim| sim.details.status.is_working() || sim.details.timestamp > cutoff);
        let evicted = before - orders.len();
        if evicted > 0 {
            tracing::debug!(evicted, tracked = orders.len(), "Evicted settled simulated orders");
        }
    }

    async fn take_fault(&self) -> Result<(), GatewayError> {
        match self.faults.lock().await.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.sequence.fetch_add(1, Ordering::Relaxed))
    }

    fn fill(&self, order: &mut OrderDetails, price: Decimal) {
        order.status = OrderStatus::Filled;
        order.executed_qty = order.requested_qty;
        order.executed_price = Some(price);
        order.fee = order.requested_qty * price * self.fee_rate;
        order.timestamp = Utc::now();
    }

    /// Fill price for a working exit leg at `last`, if it would fill
    fn leg_fill_price(order: &SimOrder, last: Decimal) -> Option<Decimal> {
        let limit = order.details.requested_price?;
        let sell = order.details.side == OrderSide::Sell;
        match order.details.order_type {
            OrderType::StopLimit => {
                let trigger = order.trigger?;
                let triggered = if sell { last <= trigger } else { last >= trigger };
                // A limit order cannot fill through its limit
                let marketable = if sell { last >= limit } else { last <= limit };
                (triggered && marketable).then_some(last)
            }
            OrderType::TakeProfitLimit => {
                let reached = if sell { last >= limit } else { last <= limit };
                reached.then_some(limit)
            }
            _ => None,
        }
    }
}

#[async_trait]
impl OrderGateway for SimulatedGateway {
    fn name(&self) -> &'static str {
        "simulation"
    }

    async fn verify_connectivity(&self) -> Result<(), GatewayError> {
        self.take_fault().await
    }

    async fn place_market_order(
        &self,
        request: MarketOrderRequest,
    ) -> Result<OrderDetails, GatewayError> {
        self.take_fault().await?;
        let last = self
            .hub
            .last_price(&request.symbol)
            .await
            .ok_or_else(|| GatewayError::NoPrice(request.symbol.clone()))?;

        let slippage = SymbolRules::resolve(&self.symbols, &request.symbol).slippage_bps / BPS;
        let price = match request.side {
            OrderSide::Buy => last * (Decimal::ONE + slippage),
            OrderSide::Sell => last * (Decimal::ONE - slippage),
        };

        let mut order = OrderDetails::new(
            request.symbol,
            request.side,
            OrderType::Market,
            request.quantity,
            None,
        );
        order.exchange_id = Some(self.next_id("SIM"));
        self.fill(&mut order, price);

        tracing::info!(
            order_id = %order.id,
            symbol = %order.symbol,
            side = order.side.as_str(),
            qty = %order.executed_qty,
            %price,
            "Simulated market order filled"
        );

        let mut orders = self.orders.write().await;
        self.evict_terminal(&mut orders);
        orders.insert(
            order.id,
            SimOrder {
                details: order.clone(),
                trigger: None,
                sibling: None,
            },
        );
        Ok(order)
    }

    async fn place_oco_exit(&self, request: OcoExitRequest) -> Result<OcoOrder, GatewayError> {
        self.take_fault().await?;
        let valid = match request.side {
            OrderSide::Sell => request.stop_price < request.take_profit_price,
            OrderSide::Buy => request.stop_price > request.take_profit_price,
        };
        if !valid || request.quantity <= Decimal::ZERO {
            return Err(GatewayError::Rejected {
                code: None,
                reason: "exit prices are on the wrong side of each other".to_string(),
            });
        }

        let list_id = self.next_id("SIM-OCO");
        let mut stop_leg = OrderDetails::new(
            request.symbol.clone(),
            request.side,
            OrderType::StopLimit,
            request.quantity,
            Some(request.stop_limit_price),
        );
        let mut take_profit_leg = OrderDetails::new(
            request.symbol,
            request.side,
            OrderType::TakeProfitLimit,
            request.quantity,
            Some(request.take_profit_price),
        );
        for leg in [&mut stop_leg, &mut take_profit_leg] {
            leg.exchange_id = Some(self.next_id("SIM"));
            leg.list_id = Some(list_id.clone());
        }

        let mut orders = self.orders.write().await;
        self.evict_terminal(&mut orders);
        orders.insert(
            stop_leg.id,
            SimOrder {
                details: stop_leg.clone(),
                trigger: Some(request.stop_price),
                sibling: Some(take_profit_leg.id),
            },
        );
        orders.insert(
            take_profit_leg.id,
            SimOrder {
                details: take_profit_leg.clone(),
                trigger: None,
                sibling: Some(stop_leg.id),
            },
        );

        tracing::debug!(
            %list_id,
            stop = %request.stop_price,
            take_profit = %request.take_profit_price,
            "Simulated OCO placed"
        );
        Ok(OcoOrder {
            stop_leg,
            take_profit_leg,
        })
    }

    async fn get_order_status(&self, order: &OrderDetails) -> Result<OrderDetails, GatewayError> {
        self.take_fault().await?;
        let last = self.hub.last_price(&order.symbol).await;

        let mut orders = self.orders.write().await;
        let fill_price = {
            let sim = orders
                .get(&order.id)
                .ok_or_else(|| GatewayError::NotFound(order.id.to_string()))?;
            match last {
                Some(last) if sim.details.status.is_working() => {
                    Self::leg_fill_price(sim, last).map(|price| (price, sim.sibling))
                }
                _ => None,
            }
        };

        if let Some((price, sibling)) = fill_price {
            if let Some(sim) = orders.get_mut(&order.id) {
                self.fill(&mut sim.details, price);
            }
            if let Some(other) = sibling.and_then(|id| orders.get_mut(&id)) {
                if other.details.status.is_working() {
                    other.details.status = OrderStatus::Canceled;
                    other.details.timestamp = Utc::now();
                }
            }
        }

        orders
            .get(&order.id)
            .map(|sim| sim.details.clone())
            .ok_or_else(|| GatewayError::NotFound(order.id.to_string()))
    }

    async fn cancel_order(&self, order: &OrderDetails) -> Result<OrderDetails, GatewayError> {
        self.take_fault().await?;
        let mut orders = self.orders.write().await;
        let sim = orders
            .get_mut(&order.id)
            .ok_or_else(|| GatewayError::NotFound(order.id.to_string()))?;
        if sim.details.status.is_working() {
            sim.details.status = OrderStatus::Canceled;
            sim.details.timestamp = Utc::now();
        }
        Ok(sim.details.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::PriceTick;

    async fn gateway_at(price: Decimal, slippage_bps: Decimal) -> (Arc<PriceHub>, SimulatedGateway) {
        let hub = Arc::new(PriceHub::new(chrono::Duration::minutes(5)));
        hub.publish(PriceTick::now("BTCUSDT", price)).await;
        let mut symbols = HashMap::new();
        symbols.insert(
            "BTCUSDT".to_string(),
            SymbolRules {
                slippage_bps,
                ..Default::default()
            },
        );
        let gateway = SimulatedGateway::new(hub.clone(), dec!(0.001), symbols);
        (hub, gateway)
    }

    fn market(side: OrderSide, quantity: Decimal) -> MarketOrderRequest {
        MarketOrderRequest {
            symbol: "BTCUSDT".to_string(),
            side,
            quantity,
        }
    }

    fn long_exit() -> OcoExitRequest {
        OcoExitRequest {
            symbol: "BTCUSDT".to_string(),
            side: OrderSide::Sell,
            quantity: dec!(2),
            entry_price: dec!(100),
            stop_price: dec!(95),
            stop_limit_price: dec!(94.905),
            take_profit_price: dec!(110),
        }
    }

    #[tokio::test]
    async fn test_market_fill_with_slippage() {
        let (_hub, gateway) = gateway_at(dec!(100), dec!(10)).await;

        let buy = gateway
            .place_market_order(market(OrderSide::Buy, dec!(2)))
            .await
            .unwrap();
        assert!(buy.is_filled());
        assert_eq!(buy.executed_price, Some(dec!(100.1)));
        assert_eq!(buy.fee, dec!(0.2002));
        assert!(buy.exchange_id.is_some());

        let sell = gateway
            .place_market_order(market(OrderSide::Sell, dec!(1)))
            .await
            .unwrap();
        assert_eq!(sell.executed_price, Some(dec!(99.9)));
    }

    #[tokio::test]
    async fn test_market_without_price() {
        let hub = Arc::new(PriceHub::new(chrono::Duration::minutes(5)));
        let gateway = SimulatedGateway::new(hub, dec!(0.001), HashMap::new());
        let result = gateway
            .place_market_order(market(OrderSide::Buy, dec!(1)))
            .await;
        assert_eq!(result, Err(GatewayError::NoPrice("BTCUSDT".into())));
    }

    #[tokio::test]
    async fn test_oco_take_profit_fills_and_cancels_stop() {
        let (hub, gateway) = gateway_at(dec!(100), dec!(0)).await;
        let oco = gateway.place_oco_exit(long_exit()).await.unwrap();
        assert_eq!(oco.stop_leg.list_id, oco.take_profit_leg.list_id);

        let pending = gateway.get_order_status(&oco.take_profit_leg).await.unwrap();
        assert_eq!(pending.status, OrderStatus::New);

        hub.publish(PriceTick::now("BTCUSDT", dec!(111))).await;
        let filled = gateway.get_order_status(&oco.take_profit_leg).await.unwrap();
        assert!(filled.is_filled());
        assert_eq!(filled.executed_price, Some(dec!(110)));

        let stop = gateway.get_order_status(&oco.stop_leg).await.unwrap();
        assert_eq!(stop.status, OrderStatus::Canceled);
    }

    #[tokio::test]
    async fn test_stop_leg_fills_at_market_within_limit() {
        let (hub, gateway) = gateway_at(dec!(100), dec!(0)).await;
        let oco = gateway.place_oco_exit(long_exit()).await.unwrap();

        hub.publish(PriceTick::now("BTCUSDT", dec!(94.95))).await;
        let stop = gateway.get_order_status(&oco.stop_leg).await.unwrap();
        assert!(stop.is_filled());
        assert_eq!(stop.executed_price, Some(dec!(94.95)));
    }

    #[tokio::test]
    async fn test_stop_leg_gapped_through_limit_stays_working() {
        let (hub, gateway) = gateway_at(dec!(100), dec!(0)).await;
        let oco = gateway.place_oco_exit(long_exit()).await.unwrap();

        hub.publish(PriceTick::now("BTCUSDT", dec!(90))).await;
        let stop = gateway.get_order_status(&oco.stop_leg).await.unwrap();
        assert_eq!(stop.status, OrderStatus::New);

        let canceled = gateway.cancel_order(&oco.stop_leg).await.unwrap();
        assert_eq!(canceled.status, OrderStatus::Canceled);
    }

    #[tokio::test]
    async fn test_invalid_oco_rejected() {
        let (_hub, gateway) = gateway_at(dec!(100), dec!(0)).await;
        let mut request = long_exit();
        request.stop_price = dec!(120);
        let result = gateway.place_oco_exit(request).await;
        assert!(matches!(result, Err(GatewayError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_cancel_filled_order_is_noop() {
        let (_hub, gateway) = gateway_at(dec!(100), dec!(0)).await;
        let order = gateway
            .place_market_order(market(OrderSide::Buy, dec!(1)))
            .await
            .unwrap();
        let after = gateway.cancel_order(&order).await.unwrap();
        assert_eq!(after.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let (_hub, gateway) = gateway_at(dec!(100), dec!(0)).await;
        let ghost = OrderDetails::new("BTCUSDT", OrderSide::Sell, OrderType::Market, dec!(1), None);
        assert!(matches!(
            gateway.get_order_status(&ghost).await,
            Err(GatewayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_fault_consumed_once() {
        let (_hub, gateway) = gateway_at(dec!(100), dec!(0)).await;
        gateway.inject_fault(GatewayError::Timeout).await;

        assert_eq!(
            gateway
                .place_market_order(market(OrderSide::Buy, dec!(1)))
                .await,
            Err(GatewayError::Timeout)
        );
        assert!(gateway
            .place_market_order(market(OrderSide::Buy, dec!(1)))
            .await
            .is_ok());
        assert_eq!(gateway.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_terminal_orders_evicted_after_retention() {
        let (_hub, gateway) = gateway_at(dec!(100), dec!(0)).await;
        let gateway = gateway.with_retention(chrono::Duration::zero());

        let entry = gateway
            .place_market_order(market(OrderSide::Buy, dec!(2)))
            .await
            .unwrap();
        let oco = gateway.place_oco_exit(long_exit()).await.unwrap();
        // The filled entry is gone, the working legs are kept
        assert_eq!(gateway.order_count().await, 2);
        assert!(matches!(
            gateway.get_order_status(&entry).await,
            Err(GatewayError::NotFound(_))
        ));

        gateway.cancel_order(&oco.stop_leg).await.unwrap();
        gateway.cancel_order(&oco.take_profit_leg).await.unwrap();
        gateway
            .place_market_order(market(OrderSide::Sell, dec!(2)))
            .await
            .unwrap();
        assert_eq!(gateway.order_count().await, 1);
    }
}
