//! Engine facade
//!
//! Wires the ledger, gateways, state machine, monitor and coordinator
//! together and exposes the read and override APIs used by operators.

use crate::config::Config;
use crate::coordinator::TradeCoordinator;
use crate::error::EngineError;
use crate::execution::{GatewaySet, RetryPolicy, SimulatedGateway};
use crate::exit::ExitCalculator;
use crate::feed::PriceHub;
use crate::monitor::PositionMonitor;
use crate::notify::Notifier;
use crate::opportunity::Opportunity;
use crate::risk::{CapitalLedger, LedgerSnapshot};
use crate::store::TradeStore;
use crate::trade::{Trade, TradeId, TradeMode, TradeStateMachine, TradeStatus};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// How long `shutdown` waits for each watcher to persist
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// The execution and exit-management engine
pub struct TradingEngine {
    store: Arc<dyn TradeStore>,
    hub: Arc<PriceHub>,
    ledger: Arc<CapitalLedger>,
    machine: Arc<TradeStateMachine>,
    monitor: Arc<PositionMonitor>,
    coordinator: TradeCoordinator,
}

impl TradingEngine {
    /// Build the engine around injected collaborators
    ///
    /// Loads the ledger snapshots from `store`; call [`start`](Self::start)
    /// afterwards to resume monitoring of persisted trades.
    pub async fn new(
        config: &Config,
        store: Arc<dyn TradeStore>,
        gateways: GatewaySet,
        hub: Arc<PriceHub>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, EngineError> {
        let ledger = Arc::new(
            CapitalLedger::load(store.clone(), config.risk.clone(), &config.ledger).await?,
        );
        let exits = ExitCalculator::from_config(&config.exit);
        tracing::info!(strategy = exits.strategy_name(), "Exit strategy selected");

        let machine = Arc::new(TradeStateMachine::new(
            gateways.clone(),
            ledger.clone(),
            store.clone(),
            notifier.clone(),
            hub.clone(),
            exits,
            RetryPolicy::from_config(&config.execution.retry),
            config.exit.replace_on_trail,
        ));
        let monitor = Arc::new(PositionMonitor::new(
            machine.clone(),
            hub.clone(),
            store.clone(),
            notifier.clone(),
            config.monitor.clone(),
        ));
        let coordinator = TradeCoordinator::new(
            ledger.clone(),
            gateways,
            hub.clone(),
            machine.clone(),
            monitor.clone(),
            notifier,
            config.symbols.clone(),
        );

        Ok(Self {
            store,
            hub,
            ledger,
            machine,
            monitor,
            coordinator,
        })
    }

    /// Paper-only engine backed by the simulation gateway
    pub async fn simulated(
        config: &Config,
        store: Arc<dyn TradeStore>,
        hub: Arc<PriceHub>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, EngineError> {
        let sim = Arc::new(SimulatedGateway::new(
            hub.clone(),
            config.execution.fee_rate,
            config.symbols.clone(),
        ));
        Self::new(config, store, GatewaySet::new(sim), hub, notifier).await
    }

    pub fn hub(&self) -> &Arc<PriceHub> {
        &self.hub
    }

    pub fn monitor(&self) -> &Arc<PositionMonitor> {
        &self.monitor
    }

    /// Resume monitoring of persisted trades
    ///
    /// Trades caught mid-entry are failed for review, never re-entered.
    /// Returns the number of watchers started.
    pub async fn start(&self) -> Result<usize, EngineError> {
        let trades = self.store.load_open_trades().await?;
        let mut watching = 0;

        for mut trade in trades {
            match trade.status {
                TradeStatus::Opening => self.machine.abandon_opening(&mut trade).await?,
                status if status.is_active() => {
                    tracing::info!(
                        trade_id = %trade.id,
                        symbol = %trade.symbol,
                        mode = %trade.mode,
                        %status,
                        stop = ?trade.stop_price(),
                        "Rehydrating trade"
                    );
                    if self.monitor.watch(trade).await {
                        watching += 1;
                    }
                }
                _ => {}
            }
        }

        tracing::info!(watching, "Engine started");
        Ok(watching)
    }

    /// Gate and open a trade for a validated opportunity
    pub async fn accept_opportunity(
        &self,
        opportunity: &mut Opportunity,
    ) -> Result<TradeId, EngineError> {
        self.coordinator.accept_opportunity(opportunity).await
    }

    /// Trades of `mode` that are open or closing
    pub async fn get_open_trades(&self, mode: TradeMode) -> Result<Vec<Trade>, EngineError> {
        let mut trades: Vec<Trade> = self
            .store
            .load_open_trades()
            .await?
            .into_iter()
            .filter(|t| t.mode == mode && t.status.is_active())
            .collect();
        trades.sort_by_key(|t| t.created_at);
        Ok(trades)
    }

    pub async fn get_ledger_status(&self, mode: TradeMode) -> Result<LedgerSnapshot, EngineError> {
        self.ledger.snapshot(mode, Utc::now()).await
    }

    /// Flatten a trade on operator request
    ///
    /// Goes through the trade's watcher when one is running so the exit is
    /// serialized with its price ticks.
    pub async fn force_close(
        &self,
        id: TradeId,
        reason: impl Into<String>,
    ) -> Result<Trade, EngineError> {
        let reason = reason.into();
        tracing::warn!(trade_id = %id, %reason, "Force close requested");

        if let Some(result) = self.monitor.force_close(id, reason.clone()).await {
            return result;
        }

        let mut trade = self
            .store
            .load_trade(id)
            .await?
            .ok_or(EngineError::TradeNotFound(id))?;
        trade.annotate(format!("force close: {reason}"));
        // Not tied to the monitor, which may already be stopped
        let (_running, stop) = watch::channel(false);
        self.machine.force_close(&mut trade, &stop).await?;
        Ok(trade)
    }

    /// Stop every watcher after it persists its trade
    pub async fn shutdown(&self) {
        self.monitor.shutdown(SHUTDOWN_GRACE).await;
        tracing::info!("Engine stopped");
    }
}
