//! Order gateway module
//!
//! One contract for the simulation backend and the live exchange, so the
//! trade state machine never branches on mode.

mod live;
mod retry;
mod simulation;
mod types;

pub use live::LiveGateway;
pub use retry::RetryPolicy;
pub use simulation::SimulatedGateway;
pub use types::{
    GatewayError, MarketOrderRequest, OcoExitRequest, OcoOrder, OrderDetails, OrderId, OrderSide,
    OrderStatus, OrderType,
};

use crate::trade::TradeMode;
use async_trait::async_trait;
use std::sync::Arc;

/// Places, queries and cancels orders
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Check the backend is reachable and credentials are accepted
    async fn verify_connectivity(&self) -> Result<(), GatewayError>;

    /// Market order, returned once the backend has acknowledged it
    async fn place_market_order(
        &self,
        request: MarketOrderRequest,
    ) -> Result<OrderDetails, GatewayError>;

    /// Linked stop-limit / take-profit pair
    async fn place_oco_exit(&self, request: OcoExitRequest) -> Result<OcoOrder, GatewayError>;

    /// Latest state of a previously placed order
    async fn get_order_status(&self, order: &OrderDetails) -> Result<OrderDetails, GatewayError>;

    /// Cancel a working order; a filled order is returned unchanged
    async fn cancel_order(&self, order: &OrderDetails) -> Result<OrderDetails, GatewayError>;
}

/// Gateways by trading mode
#[derive(Clone)]
pub struct GatewaySet {
    paper: Arc<dyn OrderGateway>,
    real: Option<Arc<dyn OrderGateway>>,
}

impl GatewaySet {
    pub fn new(paper: Arc<dyn OrderGateway>) -> Self {
        Self { paper, real: None }
    }

    pub fn with_real(mut self, real: Arc<dyn OrderGateway>) -> Self {
        self.real = Some(real);
        self
    }

    /// Gateway for `mode`, if one is configured
    pub fn get(&self, mode: TradeMode) -> Option<Arc<dyn OrderGateway>> {
        match mode {
            TradeMode::Paper => Some(self.paper.clone()),
            TradeMode::Real => self.real.clone(),
        }
    }
}
