//! JSON file store
//!
//! Layout: `<dir>/trades/<trade id>.json` and `<dir>/ledger/<mode>.json`.
//! Writes go to a temporary sibling first and are renamed into place, so a
//! reader never sees a half-written file.

use super::{check_closed_immutable, StoreError, TradeStore};
use crate::risk::LedgerSnapshot;
use crate::trade::{Trade, TradeId, TradeMode};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Durable store writing one JSON document per record
pub struct JsonFileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = dir.into();
        tokio::fs::create_dir_all(root.join("trades")).await?;
        tokio::fs::create_dir_all(root.join("ledger")).await?;
        tracing::debug!(dir = %root.display(), "Opened JSON state store");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn trade_path(&self, id: TradeId) -> PathBuf {
        self.root.join("trades").join(format!("{id}.json"))
    }

    fn ledger_path(&self, mode: TradeMode) -> PathBuf {
        self.root.join("ledger").join(format!("{}.json", mode.as_str()))
    }

    async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl TradeStore for JsonFileStore {
    async fn save_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.trade_path(trade.id);
        if let Some(existing) = Self::read_optional::<Trade>(&path).await? {
            check_closed_immutable(&existing, trade)?;
        }
        Self::write_atomic(&path, trade).await
    }

    async fn load_trade(&self, id: TradeId) -> Result<Option<Trade>, StoreError> {
        Self::read_optional(&self.trade_path(id)).await
    }

    async fn load_open_trades(&self) -> Result<Vec<Trade>, StoreError> {
        let mut open = vec![];
        let mut entries = tokio::fs::read_dir(self.root.join("trades")).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(trade) = Self::read_optional::<Trade>(&path).await? {
                if !trade.status.is_terminal() {
                    open.push(trade);
                }
            }
        }
        open.sort_by_key(|t| t.created_at);
        Ok(open)
    }

    async fn save_ledger_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        Self::write_atomic(&self.ledger_path(snapshot.mode), snapshot).await
    }

    async fn load_ledger_snapshot(
        &self,
        mode: TradeMode,
    ) -> Result<Option<LedgerSnapshot>, StoreError> {
        Self::read_optional(&self.ledger_path(mode)).await
    }
}
