//! Live exchange gateway
//!
//! Binance spot REST API with HMAC-SHA256 signed requests. Credentials are
//! fetched from the vault for every request and dropped with it.

use super::{
    GatewayError, MarketOrderRequest, OcoExitRequest, OcoOrder, OrderDetails, OrderGateway,
    OrderStatus, OrderType,
};
use crate::config::{ExecutionConfig, SymbolRules};
use crate::risk::round_to_step;
use crate::vault::{CredentialVault, Credentials};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Tolerated clock drift for signed requests (ms)
const RECV_WINDOW: u64 = 5000;

/// Unknown order on query / cancel
const UNKNOWN_ORDER_CODES: [i64; 2] = [-2013, -2011];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: i64,
    #[serde(default)]
    order_list_id: i64,
    status: String,
    #[serde(rename = "type")]
    order_type: String,
    #[serde(default)]
    executed_qty: Decimal,
    #[serde(default)]
    cummulative_quote_qty: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OcoResponse {
    order_list_id: i64,
    order_reports: Vec<OrderResponse>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

/// Real-capital gateway
pub struct LiveGateway {
    client: reqwest::Client,
    base_url: String,
    fee_rate: Decimal,
    vault: Arc<dyn CredentialVault>,
    symbols: HashMap<String, SymbolRules>,
}

impl LiveGateway {
    pub fn new(
        config: &ExecutionConfig,
        vault: Arc<dyn CredentialVault>,
        symbols: HashMap<String, SymbolRules>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            fee_rate: config.fee_rate,
            vault,
            symbols,
        })
    }

    fn sign(secret: &str, payload: &str) -> Result<String, GatewayError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| GatewayError::Credentials(e.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_query(credentials: &Credentials, params: &str) -> Result<String, GatewayError> {
        let timestamp = Utc::now().timestamp_millis();
        let base = if params.is_empty() {
            format!("timestamp={timestamp}&recvWindow={RECV_WINDOW}")
        } else {
            format!("{params}&timestamp={timestamp}&recvWindow={RECV_WINDOW}")
        };
        let signature = Self::sign(&credentials.secret, &base)?;
        Ok(format!("{base}&signature={signature}"))
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &str,
    ) -> Result<T, GatewayError> {
        let credentials = self
            .vault
            .credentials()
            .await
            .map_err(|e| GatewayError::Credentials(e.to_string()))?;
        let query = Self::signed_query(&credentials, params)?;
        let url = format!("{}{}?{}", self.base_url, path, query);

        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &credentials.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;
        drop(credentials);

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| GatewayError::Transient(format!("unreadable response from {path}: {e}")))
    }

    fn price(&self, symbol: &str, price: Decimal) -> Decimal {
        let tick = SymbolRules::resolve(&self.symbols, symbol).tick_size;
        round_to_step(price, tick).normalize()
    }

    fn quantity(&self, symbol: &str, quantity: Decimal) -> Decimal {
        let step = SymbolRules::resolve(&self.symbols, symbol).lot_step;
        round_to_step(quantity, step).normalize()
    }

    fn apply(&self, order: &mut OrderDetails, response: &OrderResponse) {
        order.exchange_id = Some(response.order_id.to_string());
        if response.order_list_id >= 0 {
            order.list_id = Some(response.order_list_id.to_string());
        }
        order.status = parse_status(&response.status);
        order.executed_qty = response.executed_qty;
        if response.executed_qty > Decimal::ZERO {
            order.executed_price = Some(response.cummulative_quote_qty / response.executed_qty);
            order.fee = response.cummulative_quote_qty * self.fee_rate;
        }
        order.timestamp = Utc::now();
    }

    fn exchange_id(order: &OrderDetails) -> Result<&str, GatewayError> {
        order
            .exchange_id
            .as_deref()
            .ok_or_else(|| GatewayError::NotFound(order.id.to_string()))
    }
}

fn parse_status(status: &str) -> OrderStatus {
    match status {
        "NEW" | "PENDING_NEW" => OrderStatus::New,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "FILLED" => OrderStatus::Filled,
        "REJECTED" => OrderStatus::Rejected,
        _ => OrderStatus::Canceled,
    }
}

fn map_transport_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transient(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &str) -> GatewayError {
    if status == StatusCode::TOO_MANY_REQUESTS
        || status.as_u16() == 418
        || status.is_server_error()
    {
        return GatewayError::Transient(format!("{status}: {body}"));
    }
    match serde_json::from_str::<ApiError>(body) {
        Ok(api) if UNKNOWN_ORDER_CODES.contains(&api.code) => GatewayError::NotFound(api.msg),
        Ok(api) => GatewayError::Rejected {
            code: Some(api.code),
            reason: api.msg,
        },
        Err(_) => GatewayError::Rejected {
            code: None,
            reason: format!("{status}: {body}"),
        },
    }
}

#[async_trait]
impl OrderGateway for LiveGateway {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn verify_connectivity(&self) -> Result<(), GatewayError> {
        let _: serde_json::Value = self.signed(Method::GET, "/api/v3/account", "").await?;
        Ok(())
    }

    async fn place_market_order(
        &self,
        request: MarketOrderRequest,
    ) -> Result<OrderDetails, GatewayError> {
        let quantity = self.quantity(&request.symbol, request.quantity);
        let mut order = OrderDetails::new(
            request.symbol,
            request.side,
            OrderType::Market,
            quantity,
            None,
        );
        let params = format!(
            "symbol={}&side={}&type=MARKET&quantity={}&newClientOrderId={}&newOrderRespType=RESULT",
            order.symbol,
            order.side.as_str(),
            quantity,
            order.id.simple()
        );
        let response: OrderResponse = self.signed(Method::POST, "/api/v3/order", &params).await?;
        self.apply(&mut order, &response);

        tracing::info!(
            order_id = %order.id,
            exchange_id = ?order.exchange_id,
            symbol = %order.symbol,
            status = ?order.status,
            "Live market order placed"
        );
        Ok(order)
    }

    async fn place_oco_exit(&self, request: OcoExitRequest) -> Result<OcoOrder, GatewayError> {
        let symbol = request.symbol.as_str();
        let quantity = self.quantity(symbol, request.quantity);
        let take_profit = self.price(symbol, request.take_profit_price);
        let stop = self.price(symbol, request.stop_price);
        let stop_limit = self.price(symbol, request.stop_limit_price);

        let params = format!(
            "symbol={}&side={}&quantity={}&price={}&stopPrice={}&stopLimitPrice={}&stopLimitTimeInForce=GTC",
            symbol,
            request.side.as_str(),
            quantity,
            take_profit,
            stop,
            stop_limit
        );
        let response: OcoResponse = self
            .signed(Method::POST, "/api/v3/order/oco", &params)
            .await?;

        let mut stop_leg = OrderDetails::new(
            symbol,
            request.side,
            OrderType::StopLimit,
            quantity,
            Some(stop_limit),
        );
        let mut take_profit_leg = OrderDetails::new(
            symbol,
            request.side,
            OrderType::TakeProfitLimit,
            quantity,
            Some(take_profit),
        );
        for report in &response.order_reports {
            if report.order_type.starts_with("STOP_LOSS") {
                self.apply(&mut stop_leg, report);
            } else {
                self.apply(&mut take_profit_leg, report);
            }
        }
        if stop_leg.exchange_id.is_none() || take_profit_leg.exchange_id.is_none() {
            return Err(GatewayError::Rejected {
                code: None,
                reason: format!("order list {} missing a leg", response.order_list_id),
            });
        }

        tracing::info!(
            list_id = response.order_list_id,
            %symbol,
            %stop,
            %take_profit,
            "Live OCO exit placed"
        );
        Ok(OcoOrder {
            stop_leg,
            take_profit_leg,
        })
    }

    async fn get_order_status(&self, order: &OrderDetails) -> Result<OrderDetails, GatewayError> {
        let params = format!(
            "symbol={}&orderId={}",
            order.symbol,
            Self::exchange_id(order)?
        );
        let response: OrderResponse = self.signed(Method::GET, "/api/v3/order", &params).await?;
        let mut updated = order.clone();
        self.apply(&mut updated, &response);
        Ok(updated)
    }

    async fn cancel_order(&self, order: &OrderDetails) -> Result<OrderDetails, GatewayError> {
        let params = format!(
            "symbol={}&orderId={}",
            order.symbol,
            Self::exchange_id(order)?
        );
        match self
            .signed::<OrderResponse>(Method::DELETE, "/api/v3/order", &params)
            .await
        {
            Ok(response) => {
                let mut updated = order.clone();
                self.apply(&mut updated, &response);
                Ok(updated)
            }
            // Already filled or cancelled: report the final state
            Err(GatewayError::Rejected { .. }) => self.get_order_status(order).await,
            Err(e) => Err(e),
        }
    }
}
