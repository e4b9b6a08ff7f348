//! Capital ledger
//!
//! One snapshot per trading mode, each behind its own mutex. Every mutation
//! happens on a copy that is persisted before it replaces the in-memory
//! state, so a storage failure never advances the ledger.

use super::sizing::{compute_quantity, SizedPosition};
use super::RiskError;
use crate::config::{LedgerConfig, RiskConfig, SymbolRules};
use crate::error::EngineError;
use crate::store::TradeStore;
use crate::telemetry::{set_gauge, GaugeMetric};
use crate::trade::{TradeId, TradeMode};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Recently settled trades remembered per mode
const SETTLED_HISTORY: usize = 512;

/// Ledger state for one mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub mode: TradeMode,
    /// Total balance, moved only by realized P&L
    pub total_balance: Decimal,
    /// Capital held by open trades
    pub committed: Decimal,
    /// Capital put at risk since `day_start`
    pub risked_today: Decimal,
    /// Start of the trading day `risked_today` belongs to
    pub day_start: DateTime<Utc>,
    /// Real trades that reached the exchange (or are about to)
    pub real_trades_opened: u32,
    /// Real trades closed
    pub real_trades_closed: u32,
    /// Sum of realized P&L
    pub realized_pnl: Decimal,
    /// Most recent settled trades, oldest first
    #[serde(default)]
    pub settled_trades: VecDeque<TradeId>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerSnapshot {
    /// Fresh snapshot with nothing committed
    pub fn new(mode: TradeMode, balance: Decimal, day_start: DateTime<Utc>) -> Self {
        Self {
            mode,
            total_balance: balance,
            committed: Decimal::ZERO,
            risked_today: Decimal::ZERO,
            day_start,
            real_trades_opened: 0,
            real_trades_closed: 0,
            realized_pnl: Decimal::ZERO,
            settled_trades: VecDeque::new(),
            updated_at: Utc::now(),
        }
    }

    /// Balance not held by open trades
    pub fn available(&self) -> Decimal {
        self.total_balance - self.committed
    }

    /// Reset the daily counter if `day_start` is a later day; true if reset
    pub fn roll_day(&mut self, day_start: DateTime<Utc>) -> bool {
        if day_start <= self.day_start {
            return false;
        }
        self.day_start = day_start;
        self.risked_today = Decimal::ZERO;
        true
    }
}

/// Configured start of the trading day
#[derive(Debug, Clone, Copy)]
pub struct DayBoundary {
    hour_utc: u32,
}

impl DayBoundary {
    pub fn new(hour_utc: u32) -> Self {
        Self {
            hour_utc: hour_utc.min(23),
        }
    }

    /// Start of the trading day containing `now`
    pub fn start_of_day(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now
            .date_naive()
            .and_hms_opt(self.hour_utc, 0, 0)
            .map(|naive| Utc.from_utc_datetime(&naive))
            .unwrap_or(now);
        if now < today {
            today - Duration::days(1)
        } else {
            today
        }
    }
}

/// Capital reserved for a trade that is about to be entered
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub mode: TradeMode,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    /// Capital committed and counted against the daily budget
    pub capital: Decimal,
    /// Day the capital was counted against
    pub day_start: DateTime<Utc>,
    /// Whether a real-trade slot was consumed
    pub real_slot: bool,
}

/// Tracks balances, committed capital and daily risk per mode
pub struct CapitalLedger {
    paper: Mutex<LedgerSnapshot>,
    real: Mutex<LedgerSnapshot>,
    risk: RiskConfig,
    boundary: DayBoundary,
    store: Arc<dyn TradeStore>,
}

impl CapitalLedger {
    /// Load persisted snapshots, or start from configured balances
    pub async fn load(
        store: Arc<dyn TradeStore>,
        risk: RiskConfig,
        balances: &LedgerConfig,
    ) -> Result<Self, EngineError> {
        let boundary = DayBoundary::new(risk.day_boundary_hour_utc);
        let day_start = boundary.start_of_day(Utc::now());

        let paper = match store.load_ledger_snapshot(TradeMode::Paper).await? {
            Some(snapshot) => snapshot,
            None => LedgerSnapshot::new(TradeMode::Paper, balances.paper_balance, day_start),
        };
        let real = match store.load_ledger_snapshot(TradeMode::Real).await? {
            Some(snapshot) => snapshot,
            None => LedgerSnapshot::new(TradeMode::Real, balances.real_balance, day_start),
        };

        tracing::info!(
            paper_balance = %paper.total_balance,
            real_balance = %real.total_balance,
            real_trades_opened = real.real_trades_opened,
            "Capital ledger loaded"
        );

        Ok(Self {
            paper: Mutex::new(paper),
            real: Mutex::new(real),
            risk,
            boundary,
            store,
        })
    }

    pub fn risk_config(&self) -> &RiskConfig {
        &self.risk
    }

    fn slot(&self, mode: TradeMode) -> &Mutex<LedgerSnapshot> {
        match mode {
            TradeMode::Paper => &self.paper,
            TradeMode::Real => &self.real,
        }
    }

    /// Persist `next` and make it the current state
    async fn commit(
        &self,
        current: &mut LedgerSnapshot,
        mut next: LedgerSnapshot,
    ) -> Result<(), EngineError> {
        next.updated_at = Utc::now();
        self.store.save_ledger_snapshot(&next).await?;
        *current = next;
        publish_gauges(current);
        Ok(())
    }

    /// Current snapshot of a mode, applying a pending day reset
    pub async fn snapshot(
        &self,
        mode: TradeMode,
        now: DateTime<Utc>,
    ) -> Result<LedgerSnapshot, EngineError> {
        let mut current = self.slot(mode).lock().await;
        let mut next = current.clone();
        if next.roll_day(self.boundary.start_of_day(now)) {
            tracing::info!(%mode, day_start = %next.day_start, "Daily risk counter reset");
            self.commit(&mut current, next).await?;
        }
        Ok(current.clone())
    }

    /// Size a trade and reserve its capital in one critical section
    ///
    /// Checks the real-trade ceiling, rolls the trading day, sizes against the
    /// total balance and remaining daily budget, and verifies the committed
    /// total stays within the balance.
    pub async fn reserve(
        &self,
        mode: TradeMode,
        entry_price: Decimal,
        rules: &SymbolRules,
        now: DateTime<Utc>,
    ) -> Result<Reservation, EngineError> {
        let mut current = self.slot(mode).lock().await;
        let mut next = current.clone();
        next.roll_day(self.boundary.start_of_day(now));

        let real_slot = mode == TradeMode::Real;
        if real_slot && next.real_trades_opened >= self.risk.real_trade_ceiling {
            return Err(RiskError::RealTradeCeilingReached {
                ceiling: self.risk.real_trade_ceiling,
            }
            .into());
        }

        let SizedPosition {
            quantity, capital, ..
        } = compute_quantity(
            next.total_balance,
            next.risked_today,
            &self.risk,
            entry_price,
            rules,
        )?;

        if next.committed + capital > next.total_balance {
            return Err(RiskError::InsufficientCapital {
                required: capital,
                available: next.available(),
            }
            .into());
        }

        next.committed += capital;
        next.risked_today += capital;
        if real_slot {
            next.real_trades_opened += 1;
        }
        let day_start = next.day_start;
        self.commit(&mut current, next).await?;

        tracing::debug!(
            %mode,
            %quantity,
            %capital,
            risked_today = %current.risked_today,
            "Capital reserved"
        );

        Ok(Reservation {
            mode,
            quantity,
            entry_price,
            capital,
            day_start,
            real_slot,
        })
    }

    /// Undo a reservation whose entry never filled
    pub async fn release(&self, reservation: &Reservation) -> Result<(), EngineError> {
        let mut current = self.slot(reservation.mode).lock().await;
        let mut next = current.clone();
        next.committed = (next.committed - reservation.capital).max(Decimal::ZERO);
        if next.day_start == reservation.day_start {
            next.risked_today = (next.risked_today - reservation.capital).max(Decimal::ZERO);
        }
        if reservation.real_slot {
            next.real_trades_opened = next.real_trades_opened.saturating_sub(1);
        }
        self.commit(&mut current, next).await?;
        tracing::debug!(mode = %reservation.mode, capital = %reservation.capital, "Reservation released");
        Ok(())
    }

    /// Replace the reserved amount with the actual fill cost
    pub async fn confirm(
        &self,
        reservation: &Reservation,
        actual_capital: Decimal,
    ) -> Result<(), EngineError> {
        let delta = actual_capital - reservation.capital;
        if delta.is_zero() {
            return Ok(());
        }
        let mut current = self.slot(reservation.mode).lock().await;
        let mut next = current.clone();
        next.committed = (next.committed + delta).max(Decimal::ZERO);
        if next.day_start == reservation.day_start {
            next.risked_today = (next.risked_today + delta).max(Decimal::ZERO);
        }
        if next.committed > next.total_balance {
            tracing::warn!(
                mode = %reservation.mode,
                committed = %next.committed,
                balance = %next.total_balance,
                "Fill cost pushed committed capital above balance"
            );
        }
        self.commit(&mut current, next).await
    }

    /// Release a closed trade's capital and book its P&L
    ///
    /// Settling the same trade twice is a no-op, so a close that failed
    /// after this point can be retried.
    pub async fn settle(
        &self,
        trade_id: TradeId,
        mode: TradeMode,
        committed: Decimal,
        realized_pnl: Decimal,
    ) -> Result<LedgerSnapshot, EngineError> {
        let mut current = self.slot(mode).lock().await;
        if current.settled_trades.contains(&trade_id) {
            tracing::debug!(%trade_id, %mode, "Trade already settled");
            return Ok(current.clone());
        }
        let mut next = current.clone();
        next.committed = (next.committed - committed).max(Decimal::ZERO);
        next.total_balance += realized_pnl;
        next.realized_pnl += realized_pnl;
        if mode == TradeMode::Real {
            next.real_trades_closed += 1;
        }
        next.settled_trades.push_back(trade_id);
        while next.settled_trades.len() > SETTLED_HISTORY {
            next.settled_trades.pop_front();
        }
        self.commit(&mut current, next).await?;
        Ok(current.clone())
    }
}

fn publish_gauges(snapshot: &LedgerSnapshot) {
    set_gauge(
        GaugeMetric::LedgerBalance,
        snapshot.mode,
        snapshot.total_balance,
    );
    set_gauge(
        GaugeMetric::LedgerCommitted,
        snapshot.mode,
        snapshot.committed,
    );
    set_gauge(
        GaugeMetric::LedgerRiskedToday,
        snapshot.mode,
        snapshot.risked_today,
    );
}
