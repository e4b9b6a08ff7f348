//! One watcher per open trade

use super::{Debounce, WatcherCommand};
use crate::config::MonitorConfig;
use crate::error::EngineError;
use crate::execution::GatewayError;
use crate::feed::{PriceHub, PriceTick};
use crate::notify::{EventType, Notification, Notifier};
use crate::store::TradeStore;
use crate::telemetry::{increment, CounterMetric};
use crate::trade::{StopSignal, TickOutcome, Trade, TradeStateMachine, TradeStatus};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, Mutex};

/// How a watcher run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherExit {
    /// Trade reached `closed` or `failed`
    Finished,
    /// Monitoring was stopped; the trade was persisted as-is
    Stopped,
}

/// Shared pieces every watcher needs
#[derive(Clone)]
pub(crate) struct WatcherContext {
    pub machine: Arc<TradeStateMachine>,
    pub hub: Arc<PriceHub>,
    pub store: Arc<dyn TradeStore>,
    pub notifier: Arc<dyn Notifier>,
    pub config: MonitorConfig,
}

pub(crate) struct Watcher {
    trade: Trade,
    ctx: WatcherContext,
    commands: Arc<Mutex<mpsc::Receiver<WatcherCommand>>>,
    stop: StopSignal,
    stale: bool,
}

impl Watcher {
    pub fn new(
        trade: Trade,
        ctx: WatcherContext,
        commands: Arc<Mutex<mpsc::Receiver<WatcherCommand>>>,
        stop: StopSignal,
    ) -> Self {
        Self {
            trade,
            ctx,
            commands,
            stop,
            stale: false,
        }
    }

    /// Process ticks and commands until the trade ends or monitoring stops
    ///
    /// Ticks for one trade are handled strictly one at a time.
    pub async fn run(mut self) -> Result<WatcherExit, EngineError> {
        let mut prices = self.ctx.hub.subscribe(&self.trade.symbol).await;
        let commands = self.commands.clone();
        let mut commands = commands.lock().await;
        let mut debounce = Debounce::new(
            self.ctx.config.min_move_bps,
            self.ctx.config.min_interval(),
        );
        let stale_after = self.ctx.config.stale_after();

        tracing::info!(
            trade_id = %self.trade.id,
            symbol = %self.trade.symbol,
            status = %self.trade.status,
            stop = ?self.trade.stop_price(),
            "Watcher started"
        );

        if self.trade.status == TradeStatus::Closing {
            let result = self
                .ctx
                .machine
                .resume_exit(&mut self.trade, &self.stop)
                .await;
            self.absorb(result)?;
        }

        loop {
            if self.trade.status.is_terminal() {
                tracing::info!(trade_id = %self.trade.id, status = %self.trade.status, "Watcher finished");
                return Ok(WatcherExit::Finished);
            }

            let mut stop = self.stop.clone();
            tokio::select! {
                biased;

                _ = async { stop.wait_for(|stopped| *stopped).await.map(|_| ()) } => {
                    return self.persist_and_stop().await;
                }

                Some(command) = commands.recv() => match command {
                    WatcherCommand::ForceClose { note, reply } => {
                        self.trade.annotate(format!("force close: {note}"));
                        let result = self
                            .ctx
                            .machine
                            .force_close(&mut self.trade, &self.stop)
                            .await
                            .map(|_| self.trade.clone());
                        if reply.send(result).is_err() {
                            tracing::debug!(trade_id = %self.trade.id, "Force-close caller went away");
                        }
                    }
                },

                received = tokio::time::timeout(stale_after, prices.recv()) => match received {
                    Err(_) => self.on_silence(stale_after.as_secs()).await?,
                    Ok(Ok(tick)) => self.on_tick(tick, &mut debounce).await?,
                    Ok(Err(RecvError::Lagged(skipped))) => {
                        tracing::debug!(trade_id = %self.trade.id, skipped, "Watcher lagged, skipping to latest");
                    }
                    Ok(Err(RecvError::Closed)) => {
                        prices = self.ctx.hub.subscribe(&self.trade.symbol).await;
                    }
                },
            }
        }
    }

    async fn on_tick(
        &mut self,
        tick: PriceTick,
        debounce: &mut Debounce,
    ) -> Result<(), EngineError> {
        let age = Utc::now().signed_duration_since(tick.timestamp);
        if age.to_std().unwrap_or_default() > self.ctx.config.stale_after() {
            tracing::warn!(
                trade_id = %self.trade.id,
                symbol = %tick.symbol,
                age_secs = age.num_seconds(),
                "Ignoring stale tick"
            );
            return Ok(());
        }
        if self.stale {
            self.stale = false;
            tracing::info!(trade_id = %self.trade.id, symbol = %tick.symbol, "Price feed recovered");
        }

        let trail = debounce.should_evaluate(tick.price, Instant::now());
        let result = self
            .ctx
            .machine
            .on_price_tick(&mut self.trade, tick.price, trail, &self.stop)
            .await;
        if let Ok(TickOutcome::Trailed { stop_price }) = &result {
            tracing::debug!(trade_id = %self.trade.id, price = %tick.price, stop = %stop_price, "Trailing state updated");
        }
        self.absorb(result)
    }

    async fn on_silence(&mut self, silent_secs: u64) -> Result<(), EngineError> {
        if !self.stale {
            self.stale = true;
            let err = EngineError::StaleData {
                symbol: self.trade.symbol.clone(),
                silent_secs,
            };
            tracing::warn!(trade_id = %self.trade.id, error = %err, "Trailing suspended");
            increment(CounterMetric::StaleFeed, self.trade.mode);
            self.ctx.notifier.notify(Notification::warning(
                EventType::StaleFeed,
                json!({
                    "trade_id": self.trade.id,
                    "symbol": self.trade.symbol,
                    "silent_secs": silent_secs,
                }),
            ));
        }
        // An exit in progress does not need fresh prices to finish
        if self.trade.status == TradeStatus::Closing {
            let result = self
                .ctx
                .machine
                .resume_exit(&mut self.trade, &self.stop)
                .await;
            self.absorb(result)?;
        }
        Ok(())
    }

    /// Keep running on recoverable errors; bubble up the rest for a restart
    fn absorb(&self, result: Result<TickOutcome, EngineError>) -> Result<(), EngineError> {
        match result {
            Ok(_) => Ok(()),
            Err(EngineError::Gateway(GatewayError::Cancelled)) => Ok(()),
            Err(e @ EngineError::Persistence(_)) => Err(e),
            Err(EngineError::ExitUnconfirmed { .. }) if self.trade.status.is_terminal() => Ok(()),
            Err(e) => {
                tracing::warn!(
                    trade_id = %self.trade.id,
                    status = %self.trade.status,
                    error = %e,
                    "Tick processing failed, will retry"
                );
                Ok(())
            }
        }
    }

    async fn persist_and_stop(&self) -> Result<WatcherExit, EngineError> {
        if !self.trade.status.is_terminal() {
            self.ctx.store.save_trade(&self.trade).await?;
        }
        tracing::info!(trade_id = %self.trade.id, status = %self.trade.status, "Watcher stopped");
        Ok(WatcherExit::Stopped)
    }
}
