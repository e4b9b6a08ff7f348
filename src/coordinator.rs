//! Trade execution coordinator
//!
//! Entry point for validated opportunities. Runs the gate checks in a fixed
//! order, reserves capital, and hands the opportunity to the state machine.

use crate::config::SymbolRules;
use crate::error::{EngineError, GateRejection};
use crate::execution::GatewaySet;
use crate::feed::PriceHub;
use crate::monitor::PositionMonitor;
use crate::notify::{EventType, Notification, Notifier};
use crate::opportunity::{Opportunity, OpportunityStatus};
use crate::risk::{CapitalLedger, RiskError};
use crate::telemetry::{increment, CounterMetric};
use crate::trade::{Side, TradeId, TradeMode, TradeStateMachine};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

const BPS: Decimal = dec!(10000);

/// Gates opportunities and opens trades for the ones that pass
pub struct TradeCoordinator {
    ledger: Arc<CapitalLedger>,
    gateways: GatewaySet,
    hub: Arc<PriceHub>,
    machine: Arc<TradeStateMachine>,
    monitor: Arc<PositionMonitor>,
    notifier: Arc<dyn Notifier>,
    symbols: HashMap<String, SymbolRules>,
}

impl TradeCoordinator {
    pub fn new(
        ledger: Arc<CapitalLedger>,
        gateways: GatewaySet,
        hub: Arc<PriceHub>,
        machine: Arc<TradeStateMachine>,
        monitor: Arc<PositionMonitor>,
        notifier: Arc<dyn Notifier>,
        symbols: HashMap<String, SymbolRules>,
    ) -> Self {
        Self {
            ledger,
            gateways,
            hub,
            machine,
            monitor,
            notifier,
            symbols,
        }
    }

    /// Gate, size and open a trade for `opportunity`
    ///
    /// A gate or sizing failure marks the opportunity `rejected` and leaves
    /// the ledger untouched. Once capital is reserved the opportunity is
    /// `accepted`; it becomes `converted` when the entry fills.
    pub async fn accept_opportunity(
        &self,
        opportunity: &mut Opportunity,
    ) -> Result<TradeId, EngineError> {
        let reservation = match self.admit(opportunity).await {
            Ok(reservation) => reservation,
            Err(e) => {
                self.reject(opportunity, &e);
                return Err(e);
            }
        };

        opportunity.accept();
        increment(CounterMetric::OpportunityAccepted, opportunity.mode);
        tracing::info!(
            opportunity_id = %opportunity.id,
            symbol = %opportunity.symbol,
            mode = %opportunity.mode,
            quantity = %reservation.quantity,
            capital = %reservation.capital,
            "Opportunity accepted"
        );

        let trade = self.machine.open(opportunity, reservation).await?;
        opportunity.convert(trade.id);
        let id = trade.id;
        if !self.monitor.watch(trade).await {
            tracing::warn!(trade_id = %id, "Trade opened but monitor is not accepting watchers");
        }
        Ok(id)
    }

    /// Gate checks, short-circuiting on the first failure, then reservation
    async fn admit(
        &self,
        opportunity: &Opportunity,
    ) -> Result<crate::risk::Reservation, EngineError> {
        let mode = opportunity.mode;

        if opportunity.status != OpportunityStatus::Pending {
            return Err(gate(GateRejection::NotPending(opportunity.status)));
        }

        let threshold = self.ledger.risk_config().confidence_threshold(mode);
        if opportunity.confidence <= threshold {
            return Err(gate(GateRejection::ConfidenceBelowThreshold {
                confidence: opportunity.confidence,
                threshold,
                mode,
            }));
        }

        if mode == TradeMode::Real {
            let ceiling = self.ledger.risk_config().real_trade_ceiling;
            let snapshot = self.ledger.snapshot(mode, Utc::now()).await?;
            if snapshot.real_trades_opened >= ceiling {
                return Err(gate(GateRejection::RealTradeCeiling { ceiling }));
            }
        }

        let gateway = self
            .gateways
            .get(mode)
            .ok_or_else(|| gate(GateRejection::ModeUnavailable(mode)))?;
        if mode == TradeMode::Real {
            if let Err(e) = gateway.verify_connectivity().await {
                return Err(gate(GateRejection::ExchangeUnreachable(e.to_string())));
            }
        }

        let rules = SymbolRules::resolve(&self.symbols, &opportunity.symbol);
        let last = self
            .hub
            .last_price(&opportunity.symbol)
            .await
            .ok_or_else(|| gate(GateRejection::NoMarketPrice(opportunity.symbol.clone())))?;
        let entry_estimate = estimate_entry(last, opportunity.direction, rules.slippage_bps);

        // Sizing and reservation share the ledger's per-mode critical section
        self.ledger
            .reserve(mode, entry_estimate, &rules, Utc::now())
            .await
            .map_err(|e| match e {
                EngineError::Risk(RiskError::RealTradeCeilingReached { ceiling }) => {
                    gate(GateRejection::RealTradeCeiling { ceiling })
                }
                other => other,
            })
    }

    fn reject(&self, opportunity: &mut Opportunity, error: &EngineError) {
        let code = match error {
            EngineError::GateRejected(rejection) => rejection.code(),
            EngineError::Risk(RiskError::InsufficientRiskBudget { .. }) => "insufficient_risk_budget",
            EngineError::Risk(RiskError::QuantityBelowMinimum { .. }) => "quantity_below_minimum",
            EngineError::Risk(RiskError::InsufficientCapital { .. }) => "insufficient_capital",
            EngineError::Risk(_) => "sizing_failed",
            _ => "internal_error",
        };
        let reason = match error {
            EngineError::GateRejected(rejection) => rejection.to_string(),
            other => other.to_string(),
        };
        opportunity.reject(reason.clone());

        increment(CounterMetric::OpportunityRejected, opportunity.mode);
        tracing::info!(
            opportunity_id = %opportunity.id,
            symbol = %opportunity.symbol,
            mode = %opportunity.mode,
            code,
            %reason,
            "Opportunity rejected"
        );
        self.notifier.notify(Notification::info(
            EventType::OpportunityRejected,
            json!({
                "opportunity_id": opportunity.id,
                "symbol": opportunity.symbol,
                "mode": opportunity.mode,
                "code": code,
                "reason": reason,
            }),
        ));
    }
}

fn gate(rejection: GateRejection) -> EngineError {
    EngineError::GateRejected(rejection)
}

/// Expected fill for a market entry: last price pushed against us by slippage
fn estimate_entry(last: Decimal, direction: Side, slippage_bps: Decimal) -> Decimal {
    last * (Decimal::ONE + direction.sign() * slippage_bps / BPS)
}
