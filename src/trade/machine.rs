//! Trade lifecycle state machine
//!
//! `opening -> open -> closing -> closed`, with `failed` reachable from
//! `opening` and `closing`. Every transition is persisted before the
//! in-memory trade advances.

use super::{ClosingReason, Side, Trade, TradeMode, TradeStatus, TrailingStop};
use crate::error::{EngineError, GateRejection};
use crate::execution::{
    GatewayError, GatewaySet, MarketOrderRequest, OcoExitRequest, OcoOrder, OrderDetails,
    OrderGateway, OrderStatus, OrderType, RetryPolicy,
};
use crate::exit::{advance_extreme, is_stop_hit, is_take_profit_hit, recompute, ExitCalculator};
use crate::feed::PriceHub;
use crate::notify::{EventType, Notification, Notifier};
use crate::opportunity::Opportunity;
use crate::risk::{CapitalLedger, Reservation};
use crate::store::TradeStore;
use crate::telemetry::{increment, CounterMetric};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Signal that stops local monitoring of a trade
pub type StopSignal = watch::Receiver<bool>;

/// Result of feeding one price to a trade
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Nothing changed
    Held,
    /// Trailing state moved; carries the current stop
    Trailed { stop_price: Decimal },
    /// Exit filled and the trade is closed
    Closed,
}

/// Run a gateway call unless monitoring is stopped first
///
/// Dropping the call abandons the local wait only; an order the exchange
/// already accepted stays in place.
async fn until_stopped<T>(
    stop: &StopSignal,
    call: impl Future<Output = Result<T, GatewayError>>,
) -> Result<T, GatewayError> {
    let mut stop = stop.clone();
    if *stop.borrow() {
        return Err(GatewayError::Cancelled);
    }
    let stopped = async move {
        if stop.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    tokio::select! {
        result = call => result,
        _ = stopped => Err(GatewayError::Cancelled),
    }
}

fn is_plain_transient(error: &GatewayError) -> bool {
    matches!(error, GatewayError::Transient(_))
}

fn trade_payload(trade: &Trade) -> serde_json::Value {
    json!({
        "trade_id": trade.id,
        "mode": trade.mode,
        "symbol": trade.symbol,
        "side": trade.side,
        "status": trade.status,
        "quantity": trade.quantity,
        "entry_price": trade.entry_price,
        "stop_price": trade.stop_price(),
        "take_profit_price": trade.take_profit_price,
        "realized_pnl": trade.realized_pnl,
        "closing_reason": trade.closing_reason,
        "failure_reason": trade.failure_reason,
        "needs_review": trade.needs_review,
    })
}

/// Drives trades through their lifecycle
pub struct TradeStateMachine {
    gateways: GatewaySet,
    ledger: Arc<CapitalLedger>,
    store: Arc<dyn TradeStore>,
    notifier: Arc<dyn Notifier>,
    hub: Arc<PriceHub>,
    exits: ExitCalculator,
    retry: RetryPolicy,
    replace_on_trail: bool,
}

impl TradeStateMachine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateways: GatewaySet,
        ledger: Arc<CapitalLedger>,
        store: Arc<dyn TradeStore>,
        notifier: Arc<dyn Notifier>,
        hub: Arc<PriceHub>,
        exits: ExitCalculator,
        retry: RetryPolicy,
        replace_on_trail: bool,
    ) -> Self {
        Self {
            gateways,
            ledger,
            store,
            notifier,
            hub,
            exits,
            retry,
            replace_on_trail,
        }
    }

    pub fn store(&self) -> &Arc<dyn TradeStore> {
        &self.store
    }

    fn gateway(&self, mode: TradeMode) -> Result<Arc<dyn OrderGateway>, EngineError> {
        self.gateways
            .get(mode)
            .ok_or(EngineError::GateRejected(GateRejection::ModeUnavailable(mode)))
    }

    /// Persist `next` and make it the current state
    async fn commit(&self, trade: &mut Trade, next: Trade) -> Result<(), EngineError> {
        self.store.save_trade(&next).await?;
        *trade = next;
        Ok(())
    }

    fn alert(&self, notification: Notification) {
        self.notifier.notify(notification);
    }

    /// Place the entry order and bring the trade to `open`
    ///
    /// The reservation is released if the entry does not fill. Entry errors
    /// are terminal: a stale signal is never re-entered.
    pub async fn open(
        &self,
        opportunity: &Opportunity,
        reservation: Reservation,
    ) -> Result<Trade, EngineError> {
        let gateway = match self.gateway(opportunity.mode) {
            Ok(gateway) => gateway,
            Err(e) => {
                self.ledger.release(&reservation).await?;
                return Err(e);
            }
        };
        let side = opportunity.direction;
        let placeholder = OrderDetails::new(
            opportunity.symbol.clone(),
            side.entry_order_side(),
            OrderType::Market,
            reservation.quantity,
            None,
        );
        let mut trade = Trade::new(
            opportunity.mode,
            opportunity.symbol.clone(),
            side,
            opportunity.id,
            placeholder,
            reservation.capital,
        );
        if let Err(e) = self.store.save_trade(&trade).await {
            self.ledger.release(&reservation).await?;
            return Err(e.into());
        }

        tracing::info!(
            trade_id = %trade.id,
            mode = %trade.mode,
            symbol = %trade.symbol,
            side = ?side,
            qty = %reservation.quantity,
            "Placing entry order"
        );

        let request = MarketOrderRequest {
            symbol: trade.symbol.clone(),
            side: side.entry_order_side(),
            quantity: reservation.quantity,
        };
        let (entry, entry_price) = match gateway.place_market_order(request).await {
            Ok(order) => match order
                .executed_price
                .filter(|_| order.executed_qty > Decimal::ZERO)
            {
                Some(price) => (order, price),
                None => {
                    let error = GatewayError::Rejected {
                        code: None,
                        reason: format!("entry order not filled ({:?})", order.status),
                    };
                    return self.fail_entry(trade, order, &reservation, error).await;
                }
            },
            Err(e) => {
                let mut order = trade.entry_order.clone();
                order.status = OrderStatus::Rejected;
                return self.fail_entry(trade, order, &reservation, e).await;
            }
        };

        let quantity = entry.executed_qty;
        let range = self.hub.realized_range(&trade.symbol).await;
        let levels = self.exits.initial_levels(entry_price, side, range);

        let mut next = trade.clone();
        next.entry_order = entry;
        next.quantity = quantity;
        next.entry_price = Some(entry_price);
        next.capital_committed = entry_price * quantity;
        next.take_profit_price = Some(levels.take_profit_price);
        next.trailing = Some(TrailingStop {
            activation_price: levels.activation_price,
            callback_rate: levels.callback_rate,
            stop_price: levels.stop_price,
            high_water_price: entry_price,
            activated: levels.activation_price == entry_price,
        });
        next.status = TradeStatus::Open;
        next.opened_at = Some(Utc::now());
        next.ledger_committed = match self
            .ledger
            .confirm(&reservation, next.capital_committed)
            .await
        {
            Ok(()) => next.capital_committed,
            Err(e) => {
                tracing::error!(
                    trade_id = %trade.id,
                    reserved = %reservation.capital,
                    cost = %next.capital_committed,
                    error = %e,
                    "Ledger keeps the reserved amount; fill cost not confirmed"
                );
                reservation.capital
            }
        };

        if let Err(e) = self.commit(&mut trade, next).await {
            // The position exists but the store does not know it
            self.alert(Notification::critical(
                EventType::TradeFailed,
                json!({
                    "trade_id": trade.id,
                    "symbol": trade.symbol,
                    "reason": "entry filled but open state not persisted",
                    "error": e.to_string(),
                }),
            ));
            return Err(e);
        }
        increment(CounterMetric::TradeOpened, trade.mode);
        tracing::info!(
            trade_id = %trade.id,
            mode = %trade.mode,
            symbol = %trade.symbol,
            entry_price = %entry_price,
            qty = %quantity,
            stop = %levels.stop_price,
            take_profit = %levels.take_profit_price,
            strategy = self.exits.strategy_name(),
            "Trade opened"
        );

        self.cover(&mut trade, gateway.as_ref()).await?;
        self.alert(Notification::info(
            EventType::TradeOpened,
            trade_payload(&trade),
        ));
        Ok(trade)
    }

    async fn fail_entry(
        &self,
        mut trade: Trade,
        order: OrderDetails,
        reservation: &Reservation,
        error: GatewayError,
    ) -> Result<Trade, EngineError> {
        let mut next = trade.clone();
        next.entry_order = order;
        next.status = TradeStatus::Failed;
        next.failure_reason = Some(error.to_string());
        // A timed-out entry may still have been accepted
        next.needs_review = matches!(error, GatewayError::Timeout);
        next.annotate(format!("entry failed: {error}"));

        if let Err(e) = self.commit(&mut trade, next).await {
            tracing::error!(trade_id = %trade.id, error = %e, "Failed to persist entry failure");
        }
        self.ledger.release(reservation).await?;
        increment(CounterMetric::TradeFailed, trade.mode);

        tracing::warn!(
            trade_id = %trade.id,
            mode = %trade.mode,
            symbol = %trade.symbol,
            error = %error,
            "Entry order failed"
        );
        let notification = if trade.needs_review {
            Notification::critical(EventType::TradeFailed, trade_payload(&trade))
        } else {
            Notification::warning(EventType::TradeFailed, trade_payload(&trade))
        };
        self.alert(notification);
        Err(error.into())
    }

    fn oco_request(&self, trade: &Trade) -> Option<OcoExitRequest> {
        let trailing = trade.trailing.as_ref()?;
        Some(OcoExitRequest {
            symbol: trade.symbol.clone(),
            side: trade.side.exit_order_side(),
            quantity: trade.quantity,
            entry_price: trade.entry_price?,
            stop_price: trailing.stop_price,
            stop_limit_price: self.exits.stop_limit_price(trailing.stop_price, trade.side),
            take_profit_price: trade.take_profit_price?,
        })
    }

    /// Place exchange-side exit coverage for an open trade
    ///
    /// A failure leaves the trade open under software monitoring and flags it
    /// for review.
    async fn cover(&self, trade: &mut Trade, gateway: &dyn OrderGateway) -> Result<(), EngineError> {
        let Some(request) = self.oco_request(trade) else {
            return Ok(());
        };
        let result = self
            .retry
            .run_if(trade.mode, "place_oco_exit", is_plain_transient, || {
                gateway.place_oco_exit(request.clone())
            })
            .await;

        let mut next = trade.clone();
        match result {
            Ok(oco) => {
                tracing::debug!(trade_id = %trade.id, stop = %request.stop_price, "Exit coverage placed");
                next.exit_coverage = Some(oco);
            }
            Err(e) => {
                next.exit_coverage = None;
                next.needs_review = true;
                next.annotate(format!("exit coverage not placed: {e}"));
                tracing::error!(
                    trade_id = %trade.id,
                    symbol = %trade.symbol,
                    error = %e,
                    "Exit coverage missing, monitoring in software only"
                );
                let mut payload = trade_payload(&next);
                payload["error"] = json!(e.to_string());
                self.alert(Notification::critical(EventType::ExitCoverageMissing, payload));
            }
        }
        self.commit(trade, next).await
    }

    /// Feed one price to an active trade
    ///
    /// Exit levels are always checked. With `trail` false only the crossing
    /// check runs, so debounced ticks never move the stop.
    pub async fn on_price_tick(
        &self,
        trade: &mut Trade,
        price: Decimal,
        trail: bool,
        stop: &StopSignal,
    ) -> Result<TickOutcome, EngineError> {
        match trade.status {
            TradeStatus::Open => {}
            TradeStatus::Closing => return self.execute_exit(trade, stop).await,
            status => {
                return Err(EngineError::InvalidTransition {
                    id: trade.id,
                    status,
                    action: "monitor",
                })
            }
        }
        let Some(trailing) = trade.trailing.clone() else {
            return Err(EngineError::InvalidTransition {
                id: trade.id,
                status: trade.status,
                action: "monitor without trailing state",
            });
        };

        let take_profit_hit = trade
            .take_profit_price
            .is_some_and(|tp| is_take_profit_hit(price, tp, trade.side));
        if take_profit_hit {
            return self
                .begin_close(trade, ClosingReason::TakeProfit, None, stop)
                .await;
        }
        if is_stop_hit(price, trailing.stop_price, trade.side) {
            return self
                .begin_close(trade, ClosingReason::TrailingStop, None, stop)
                .await;
        }
        if !trail {
            return Ok(TickOutcome::Held);
        }

        let mut updated = trailing.clone();
        if !updated.activated {
            updated.activated = match trade.side {
                Side::Long => price >= updated.activation_price,
                Side::Short => price <= updated.activation_price,
            };
        }
        if updated.activated {
            updated.stop_price = recompute(
                updated.stop_price,
                updated.high_water_price,
                price,
                trade.side,
                updated.callback_rate,
            );
            updated.high_water_price = advance_extreme(updated.high_water_price, price, trade.side);
        }
        if updated == trailing {
            return Ok(TickOutcome::Held);
        }

        let stop_moved = updated.stop_price != trailing.stop_price;
        let mut next = trade.clone();
        next.trailing = Some(updated.clone());
        self.commit(trade, next).await?;

        if stop_moved {
            tracing::info!(
                trade_id = %trade.id,
                symbol = %trade.symbol,
                %price,
                from = %trailing.stop_price,
                to = %updated.stop_price,
                "Trailing stop moved"
            );
            if self.replace_on_trail && trade.exit_coverage.is_some() {
                if let Some(filled) = self.replace_coverage(trade, stop).await? {
                    let reason = reason_for_leg(&filled, ClosingReason::TrailingStop);
                    return self.begin_close(trade, reason, Some(filled), stop).await;
                }
            }
        }
        Ok(TickOutcome::Trailed {
            stop_price: updated.stop_price,
        })
    }

    /// Move exchange coverage to the current stop
    ///
    /// Returns a leg the exchange already filled, if cancelling found one.
    async fn replace_coverage(
        &self,
        trade: &mut Trade,
        stop: &StopSignal,
    ) -> Result<Option<OrderDetails>, EngineError> {
        let Some(old) = trade.exit_coverage.clone() else {
            return Ok(None);
        };
        let gateway = self.gateway(trade.mode)?;

        let mut retired = Vec::with_capacity(2);
        for leg in [&old.stop_leg, &old.take_profit_leg] {
            match self.cancel_leg(trade.mode, gateway.as_ref(), leg, stop).await? {
                Some(state) if state.is_filled() => return Ok(Some(state)),
                Some(state) => retired.push(state),
                None => {}
            }
        }

        let mut next = trade.clone();
        next.exit_coverage = None;
        next.exit_orders.extend(retired);
        self.commit(trade, next).await?;
        self.cover(trade, gateway.as_ref()).await?;
        Ok(None)
    }

    /// Cancel one leg; `None` when the exchange no longer knows it
    async fn cancel_leg(
        &self,
        mode: TradeMode,
        gateway: &dyn OrderGateway,
        leg: &OrderDetails,
        stop: &StopSignal,
    ) -> Result<Option<OrderDetails>, EngineError> {
        let result = self
            .retry
            .run(mode, "cancel_order", || {
                until_stopped(stop, gateway.cancel_order(leg))
            })
            .await;
        match result {
            Ok(state) => Ok(Some(state)),
            Err(GatewayError::NotFound(_)) => {
                // Gone with its sibling, or filled; ask once more
                match self.query_leg(mode, gateway, leg, stop).await {
                    Ok(state) => Ok(Some(state)),
                    Err(EngineError::Gateway(GatewayError::NotFound(_))) => Ok(None),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn query_leg(
        &self,
        mode: TradeMode,
        gateway: &dyn OrderGateway,
        leg: &OrderDetails,
        stop: &StopSignal,
    ) -> Result<OrderDetails, EngineError> {
        Ok(self
            .retry
            .run(mode, "get_order_status", || {
                until_stopped(stop, gateway.get_order_status(leg))
            })
            .await?)
    }

    /// Persist `closing` and run the exit
    async fn begin_close(
        &self,
        trade: &mut Trade,
        reason: ClosingReason,
        known_fill: Option<OrderDetails>,
        stop: &StopSignal,
    ) -> Result<TickOutcome, EngineError> {
        let mut next = trade.clone();
        next.status = TradeStatus::Closing;
        next.closing_reason = Some(reason);
        if let Some(fill) = known_fill {
            next.exit_orders.push(fill);
        }
        self.commit(trade, next).await?;
        tracing::info!(
            trade_id = %trade.id,
            symbol = %trade.symbol,
            reason = ?reason,
            "Trade closing"
        );
        self.execute_exit(trade, stop).await
    }

    /// Flatten a `closing` trade
    ///
    /// Reuses an exit that already filled, then any filled coverage leg, and
    /// only then sends a market order.
    async fn execute_exit(
        &self,
        trade: &mut Trade,
        stop: &StopSignal,
    ) -> Result<TickOutcome, EngineError> {
        if let Some(fill) = trade.exit_orders.iter().find(|o| o.is_filled()).cloned() {
            return self.close(trade, fill).await.map(|_| TickOutcome::Closed);
        }
        let gateway = self.gateway(trade.mode)?;

        if let Some(coverage) = trade.exit_coverage.clone() {
            if let Some(fill) = self
                .reconcile_coverage(trade.mode, gateway.as_ref(), &coverage, stop)
                .await?
            {
                return self.close(trade, fill).await.map(|_| TickOutcome::Closed);
            }

            let mut retired = Vec::with_capacity(2);
            for leg in [&coverage.stop_leg, &coverage.take_profit_leg] {
                match self.cancel_leg(trade.mode, gateway.as_ref(), leg, stop).await? {
                    Some(state) if state.is_filled() => {
                        return self.close(trade, state).await.map(|_| TickOutcome::Closed);
                    }
                    Some(state) => retired.push(state),
                    None => {}
                }
            }
            let mut next = trade.clone();
            next.exit_coverage = None;
            next.exit_orders.extend(retired);
            self.commit(trade, next).await?;
        }

        let request = MarketOrderRequest {
            symbol: trade.symbol.clone(),
            side: trade.side.exit_order_side(),
            quantity: trade.quantity,
        };
        let result = self
            .retry
            .run_if(trade.mode, "exit_market_order", is_plain_transient, || {
                gateway.place_market_order(request.clone())
            })
            .await;

        match result {
            Ok(order) if order.is_filled() => {
                self.close(trade, order).await.map(|_| TickOutcome::Closed)
            }
            Ok(order) => {
                let reason = format!("exit order not filled ({:?})", order.status);
                self.fail_exit(trade, Some(order), reason).await
            }
            Err(e) => self.fail_exit(trade, None, e.to_string()).await,
        }
    }

    /// First filled leg of the coverage pair, if any
    async fn reconcile_coverage(
        &self,
        mode: TradeMode,
        gateway: &dyn OrderGateway,
        coverage: &OcoOrder,
        stop: &StopSignal,
    ) -> Result<Option<OrderDetails>, EngineError> {
        for leg in [&coverage.stop_leg, &coverage.take_profit_leg] {
            match self.query_leg(mode, gateway, leg, stop).await {
                Ok(state) if state.is_filled() => return Ok(Some(state)),
                Ok(_) | Err(EngineError::Gateway(GatewayError::NotFound(_))) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn fail_exit(
        &self,
        trade: &mut Trade,
        order: Option<OrderDetails>,
        reason: String,
    ) -> Result<TickOutcome, EngineError> {
        let mut next = trade.clone();
        next.status = TradeStatus::Failed;
        next.needs_review = true;
        next.failure_reason = Some(reason.clone());
        next.exit_orders.extend(order);
        next.annotate(format!("exit failed, position left open: {reason}"));

        let persisted = self.commit(trade, next).await;
        increment(CounterMetric::TradeFailed, trade.mode);
        tracing::error!(
            trade_id = %trade.id,
            mode = %trade.mode,
            symbol = %trade.symbol,
            %reason,
            "Exit failed, position left open"
        );
        let mut payload = trade_payload(trade);
        payload["reason"] = json!(reason);
        self.alert(Notification::critical(EventType::ExitUnconfirmed, payload));

        persisted?;
        Err(EngineError::ExitUnconfirmed {
            id: trade.id,
            reason,
        })
    }

    fn alert_unrecorded_exit(&self, trade: &Trade, exit: &OrderDetails, error: &EngineError) {
        let mut payload = trade_payload(trade);
        payload["exit_order"] = json!(exit);
        payload["error"] = json!(error.to_string());
        self.alert(Notification::critical(EventType::ExitUnconfirmed, payload));
    }

    /// Record a filled exit and settle the trade
    pub async fn close(&self, trade: &mut Trade, exit: OrderDetails) -> Result<(), EngineError> {
        if trade.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                id: trade.id,
                status: trade.status,
                action: "close",
            });
        }
        let (Some(entry_price), Some(exit_price)) = (trade.entry_price, exit.executed_price) else {
            return Err(EngineError::ExitUnconfirmed {
                id: trade.id,
                reason: "exit order has no fill price".to_string(),
            });
        };
        if exit.status != OrderStatus::Filled {
            return Err(EngineError::ExitUnconfirmed {
                id: trade.id,
                reason: format!("exit order is {:?}", exit.status),
            });
        }

        let fees = trade.entry_order.fee + exit.fee;
        let pnl = (exit_price - entry_price) * trade.quantity * trade.side.sign() - fees;
        let pnl_pct = if trade.capital_committed > Decimal::ZERO {
            (pnl / trade.capital_committed * Decimal::ONE_HUNDRED).round_dp(4)
        } else {
            Decimal::ZERO
        };
        let fallback = trade.closing_reason.unwrap_or(ClosingReason::Manual);

        // Record the fill before touching the ledger so a retry reuses it
        if !trade.exit_orders.iter().any(|o| o.id == exit.id) {
            let mut recorded = trade.clone();
            recorded.exit_orders.push(exit.clone());
            if let Err(e) = self.commit(trade, recorded).await {
                self.alert_unrecorded_exit(trade, &exit, &e);
                return Err(e);
            }
        }

        if let Err(e) = self
            .ledger
            .settle(trade.id, trade.mode, trade.ledger_committed, pnl)
            .await
        {
            tracing::error!(trade_id = %trade.id, error = %e, "Failed to settle trade in ledger, close will be retried");
            let mut payload = trade_payload(trade);
            payload["reason"] = json!("exit filled but ledger not settled");
            payload["error"] = json!(e.to_string());
            self.alert(Notification::critical(EventType::ExitUnconfirmed, payload));
            return Err(e);
        }

        let mut next = trade.clone();
        next.status = TradeStatus::Closed;
        next.closing_reason = Some(reason_for_leg(&exit, fallback));
        next.realized_pnl = Some(pnl);
        next.realized_pnl_pct = Some(pnl_pct);
        next.exit_coverage = None;
        next.closed_at = Some(Utc::now());

        if let Err(e) = self.commit(trade, next).await {
            self.alert_unrecorded_exit(trade, &exit, &e);
            return Err(e);
        }

        increment(CounterMetric::TradeClosed, trade.mode);
        tracing::info!(
            trade_id = %trade.id,
            mode = %trade.mode,
            symbol = %trade.symbol,
            reason = ?trade.closing_reason,
            %entry_price,
            %exit_price,
            %pnl,
            %pnl_pct,
            "Trade closed"
        );
        self.alert(Notification::info(EventType::TradeClosed, trade_payload(trade)));
        Ok(())
    }

    /// Operator-requested exit
    ///
    /// Also retries the exit of a failed trade that still holds its position.
    pub async fn force_close(
        &self,
        trade: &mut Trade,
        stop: &StopSignal,
    ) -> Result<TickOutcome, EngineError> {
        match trade.status {
            TradeStatus::Open => {
                self.begin_close(trade, ClosingReason::Manual, None, stop)
                    .await
            }
            TradeStatus::Closing => self.execute_exit(trade, stop).await,
            TradeStatus::Failed if trade.position_left_open() => {
                let mut next = trade.clone();
                next.status = TradeStatus::Closing;
                next.closing_reason = Some(ClosingReason::Manual);
                next.annotate("operator retrying exit of failed trade");
                self.commit(trade, next).await?;
                tracing::warn!(trade_id = %trade.id, symbol = %trade.symbol, "Retrying exit of failed trade");
                self.execute_exit(trade, stop).await
            }
            status => Err(EngineError::InvalidTransition {
                id: trade.id,
                status,
                action: "force close",
            }),
        }
    }

    /// Continue the exit of a trade left in `closing`
    pub async fn resume_exit(
        &self,
        trade: &mut Trade,
        stop: &StopSignal,
    ) -> Result<TickOutcome, EngineError> {
        if trade.status != TradeStatus::Closing {
            return Err(EngineError::InvalidTransition {
                id: trade.id,
                status: trade.status,
                action: "resume exit",
            });
        }
        self.execute_exit(trade, stop).await
    }

    /// Fail a trade whose entry was in flight when the process stopped
    pub async fn abandon_opening(&self, trade: &mut Trade) -> Result<(), EngineError> {
        if trade.status != TradeStatus::Opening {
            return Err(EngineError::InvalidTransition {
                id: trade.id,
                status: trade.status,
                action: "abandon",
            });
        }
        let mut next = trade.clone();
        next.status = TradeStatus::Failed;
        next.needs_review = true;
        next.failure_reason = Some("entry in flight at shutdown".to_string());
        next.annotate("entry outcome unknown after restart; check the exchange");
        self.commit(trade, next).await?;

        increment(CounterMetric::TradeFailed, trade.mode);
        tracing::error!(trade_id = %trade.id, symbol = %trade.symbol, "Trade abandoned in opening state");
        self.alert(Notification::critical(EventType::TradeFailed, trade_payload(trade)));
        Ok(())
    }
}

fn reason_for_leg(order: &OrderDetails, fallback: ClosingReason) -> ClosingReason {
    match order.order_type {
        OrderType::StopLimit => ClosingReason::TrailingStop,
        OrderType::TakeProfitLimit => ClosingReason::TakeProfit,
        _ => fallback,
    }
}
