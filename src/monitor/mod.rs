//! Position monitor
//!
//! Supervises one watcher task per active trade. A crashed watcher is
//! restarted from the trade's persisted state; a stopped monitor lets every
//! watcher persist and exit.

mod debounce;
mod watcher;

pub use debounce::Debounce;
pub use watcher::WatcherExit;

use crate::config::MonitorConfig;
use crate::error::EngineError;
use crate::feed::PriceHub;
use crate::notify::{EventType, Notification, Notifier};
use crate::store::TradeStore;
use crate::telemetry::{increment, set_gauge, CounterMetric, GaugeMetric};
use crate::trade::{StopSignal, Trade, TradeId, TradeMode, TradeStateMachine};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use watcher::{Watcher, WatcherContext};

/// Commands a watcher accepts while it runs
#[derive(Debug)]
pub enum WatcherCommand {
    /// Flatten the position now
    ForceClose {
        /// Operator's reason, kept as an annotation
        note: String,
        reply: oneshot::Sender<Result<Trade, EngineError>>,
    },
}

struct WatcherHandle {
    mode: TradeMode,
    commands: mpsc::Sender<WatcherCommand>,
    task: JoinHandle<()>,
}

type Registry = Arc<Mutex<HashMap<TradeId, WatcherHandle>>>;

/// Supervisor for per-trade watchers
pub struct PositionMonitor {
    ctx: WatcherContext,
    watchers: Registry,
    stop_tx: watch::Sender<bool>,
}

impl PositionMonitor {
    pub fn new(
        machine: Arc<TradeStateMachine>,
        hub: Arc<PriceHub>,
        store: Arc<dyn TradeStore>,
        notifier: Arc<dyn Notifier>,
        config: MonitorConfig,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            ctx: WatcherContext {
                machine,
                hub,
                store,
                notifier,
                config,
            },
            watchers: Arc::new(Mutex::new(HashMap::new())),
            stop_tx,
        }
    }

    /// Signal that flips once the monitor is stopped
    pub fn stop_signal(&self) -> StopSignal {
        self.stop_tx.subscribe()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Start watching an active trade; false if it is already watched,
    /// not active, or the monitor is stopped
    pub async fn watch(&self, trade: Trade) -> bool {
        if self.is_stopped() || !trade.status.is_active() {
            return false;
        }
        let mut watchers = self.watchers.lock().await;
        if watchers.contains_key(&trade.id) {
            return false;
        }

        let (tx, rx) = mpsc::channel(8);
        let id = trade.id;
        let mode = trade.mode;
        let task = tokio::spawn(supervise(
            trade,
            self.ctx.clone(),
            Arc::new(Mutex::new(rx)),
            self.stop_signal(),
            self.watchers.clone(),
        ));
        watchers.insert(
            id,
            WatcherHandle {
                mode,
                commands: tx,
                task,
            },
        );
        publish_open_trades(&watchers, mode);
        true
    }

    pub async fn is_watching(&self, id: TradeId) -> bool {
        self.watchers.lock().await.contains_key(&id)
    }

    pub async fn watched(&self) -> Vec<TradeId> {
        self.watchers.lock().await.keys().copied().collect()
    }

    /// Ask the trade's watcher to flatten it
    ///
    /// `None` when no live watcher took the request.
    pub async fn force_close(
        &self,
        id: TradeId,
        note: impl Into<String>,
    ) -> Option<Result<Trade, EngineError>> {
        let commands = self.watchers.lock().await.get(&id)?.commands.clone();
        let (reply, response) = oneshot::channel();
        commands
            .send(WatcherCommand::ForceClose {
                note: note.into(),
                reply,
            })
            .await
            .ok()?;
        response.await.ok()
    }

    /// Stop every watcher and wait for them to persist
    pub async fn shutdown(&self, grace: Duration) {
        self.stop_tx.send_replace(true);
        let handles: Vec<(TradeId, WatcherHandle)> =
            self.watchers.lock().await.drain().collect();
        tracing::info!(watchers = handles.len(), "Stopping position monitor");

        for (id, handle) in handles {
            match tokio::time::timeout(grace, handle.task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(trade_id = %id, error = %e, "Watcher task failed during shutdown"),
                Err(_) => tracing::warn!(trade_id = %id, "Watcher did not stop in time"),
            }
        }
        for mode in [TradeMode::Paper, TradeMode::Real] {
            set_gauge(GaugeMetric::OpenTrades, mode, Decimal::ZERO);
        }
    }
}

fn publish_open_trades(watchers: &HashMap<TradeId, WatcherHandle>, mode: TradeMode) {
    let count = watchers.values().filter(|h| h.mode == mode).count();
    set_gauge(GaugeMetric::OpenTrades, mode, Decimal::from(count));
}

/// Run a trade's watcher, restarting it from storage when it crashes
async fn supervise(
    mut trade: Trade,
    ctx: WatcherContext,
    commands: Arc<Mutex<mpsc::Receiver<WatcherCommand>>>,
    stop: StopSignal,
    registry: Registry,
) {
    let id = trade.id;
    let mode = trade.mode;
    let mut restarts = 0u32;

    loop {
        let watcher = Watcher::new(trade.clone(), ctx.clone(), commands.clone(), stop.clone());
        let failure = match tokio::spawn(watcher.run()).await {
            Ok(Ok(_)) => break,
            Ok(Err(e)) => e.to_string(),
            Err(join) if join.is_panic() => "watcher panicked".to_string(),
            Err(_) => break,
        };
        if *stop.borrow() {
            break;
        }

        restarts += 1;
        increment(CounterMetric::WatcherRestarted, mode);
        if restarts > ctx.config.max_restarts {
            tracing::error!(trade_id = %id, restarts, %failure, "Watcher abandoned");
            ctx.notifier.notify(Notification::critical(
                EventType::WatcherAbandoned,
                json!({ "trade_id": id, "symbol": trade.symbol, "error": failure }),
            ));
            break;
        }
        tracing::warn!(trade_id = %id, restarts, %failure, "Watcher crashed, restarting");
        ctx.notifier.notify(Notification::warning(
            EventType::WatcherRestarted,
            json!({ "trade_id": id, "restarts": restarts, "error": failure }),
        ));
        tokio::time::sleep(ctx.config.restart_backoff() * restarts).await;

        match ctx.store.load_trade(id).await {
            Ok(Some(stored)) if stored.status.is_active() => trade = stored,
            Ok(Some(stored)) => {
                tracing::info!(trade_id = %id, status = %stored.status, "Trade no longer active");
                break;
            }
            Ok(None) => {
                tracing::error!(trade_id = %id, "Trade missing from store");
                break;
            }
            // Keep the last state and try the store again on the next restart
            Err(e) => tracing::error!(trade_id = %id, error = %e, "Failed to reload trade"),
        }
    }

    let mut watchers = registry.lock().await;
    watchers.remove(&id);
    publish_open_trades(&watchers, mode);
}
