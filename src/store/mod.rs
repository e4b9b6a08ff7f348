//! Persistence layer
//!
//! Trades and ledger snapshots are saved after every transition. Each call is
//! all-or-nothing: a failed save leaves the previously stored value intact.

mod file;
mod memory;
mod types;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use types::StoreError;

use crate::risk::LedgerSnapshot;
use crate::trade::{Trade, TradeId, TradeMode};
use async_trait::async_trait;

/// Trait for trade and ledger storage backends
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Insert or replace a trade
    async fn save_trade(&self, trade: &Trade) -> Result<(), StoreError>;
    /// Load a single trade
    async fn load_trade(&self, id: TradeId) -> Result<Option<Trade>, StoreError>;
    /// Load every trade not yet closed or failed
    async fn load_open_trades(&self) -> Result<Vec<Trade>, StoreError>;
    /// Insert or replace the ledger snapshot of a mode
    async fn save_ledger_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<(), StoreError>;
    /// Load the ledger snapshot of a mode
    async fn load_ledger_snapshot(
        &self,
        mode: TradeMode,
    ) -> Result<Option<LedgerSnapshot>, StoreError>;
}

/// A closed trade only accepts new audit annotations
pub(crate) fn check_closed_immutable(existing: &Trade, incoming: &Trade) -> Result<(), StoreError> {
    if existing.status != crate::trade::TradeStatus::Closed {
        return Ok(());
    }
    let mut normalized = incoming.clone();
    normalized.annotations = existing.annotations.clone();
    let extends_notes = incoming.annotations.starts_with(&existing.annotations);
    if normalized != *existing || !extends_notes {
        return Err(StoreError::ClosedTradeModified(existing.id));
    }
    Ok(())
}
