//! In-memory store

use super::{check_closed_immutable, StoreError, TradeStore};
use crate::risk::LedgerSnapshot;
use crate::trade::{Trade, TradeId, TradeMode};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Volatile store for paper sessions and tests
#[derive(Default)]
pub struct MemoryStore {
    trades: RwLock<HashMap<TradeId, Trade>>,
    ledgers: RwLock<HashMap<TradeMode, LedgerSnapshot>>,
    fail_writes: AtomicBool,
    fail_ledger_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a storage outage: every save fails until reset
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail only ledger snapshot saves; trade saves keep working
    pub fn set_fail_ledger_writes(&self, fail: bool) {
        self.fail_ledger_writes.store(fail, Ordering::SeqCst);
    }

    /// Every stored trade, in no particular order
    pub async fn all_trades(&self) -> Vec<Trade> {
        self.trades.read().await.values().cloned().collect()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn save_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut trades = self.trades.write().await;
        if let Some(existing) = trades.get(&trade.id) {
            check_closed_immutable(existing, trade)?;
        }
        trades.insert(trade.id, trade.clone());
        Ok(())
    }

    async fn load_trade(&self, id: TradeId) -> Result<Option<Trade>, StoreError> {
        Ok(self.trades.read().await.get(&id).cloned())
    }

    async fn load_open_trades(&self) -> Result<Vec<Trade>, StoreError> {
        let trades = self.trades.read().await;
        Ok(trades
            .values()
            .filter(|t| !t.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn save_ledger_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<(), StoreError> {
        self.check_writable()?;
        if self.fail_ledger_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        self.ledgers
            .write()
            .await
            .insert(snapshot.mode, snapshot.clone());
        Ok(())
    }

    async fn load_ledger_snapshot(
        &self,
        mode: TradeMode,
    ) -> Result<Option<LedgerSnapshot>, StoreError> {
        Ok(self.ledgers.read().await.get(&mode).cloned())
    }
}
