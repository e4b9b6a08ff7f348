//! Engine metrics, recorded through the `metrics` facade

use crate::trade::TradeMode;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::time::Duration;

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Opportunity passed all gates
    OpportunityAccepted,
    /// Opportunity failed a gate or sizing
    OpportunityRejected,
    /// Entry filled, trade open
    TradeOpened,
    /// Exit filled, trade closed
    TradeClosed,
    /// Trade reached the failed state
    TradeFailed,
    /// Watcher crashed and was restarted
    WatcherRestarted,
    /// Gateway call retried after a transient error
    GatewayRetry,
    /// Price feed went silent for an open trade
    StaleFeed,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Open trade count
    OpenTrades,
    /// Ledger total balance
    LedgerBalance,
    /// Capital committed to open trades
    LedgerCommitted,
    /// Capital risked in the current trading day
    LedgerRiskedToday,
}

impl CounterMetric {
    fn name(&self) -> &'static str {
        match self {
            CounterMetric::OpportunityAccepted => "trailguard_opportunities_accepted_total",
            CounterMetric::OpportunityRejected => "trailguard_opportunities_rejected_total",
            CounterMetric::TradeOpened => "trailguard_trades_opened_total",
            CounterMetric::TradeClosed => "trailguard_trades_closed_total",
            CounterMetric::TradeFailed => "trailguard_trades_failed_total",
            CounterMetric::WatcherRestarted => "trailguard_watcher_restarts_total",
            CounterMetric::GatewayRetry => "trailguard_gateway_retries_total",
            CounterMetric::StaleFeed => "trailguard_stale_feed_total",
        }
    }
}

impl GaugeMetric {
    fn name(&self) -> &'static str {
        match self {
            GaugeMetric::OpenTrades => "trailguard_open_trades",
            GaugeMetric::LedgerBalance => "trailguard_ledger_balance",
            GaugeMetric::LedgerCommitted => "trailguard_ledger_committed",
            GaugeMetric::LedgerRiskedToday => "trailguard_ledger_risked_today",
        }
    }
}

/// Increment a counter for a trading mode
pub fn increment(metric: CounterMetric, mode: TradeMode) {
    ::metrics::counter!(metric.name(), "mode" => mode.as_str()).increment(1);
}

/// Set a gauge value for a trading mode
pub fn set_gauge(metric: GaugeMetric, mode: TradeMode, value: Decimal) {
    let value = value.to_f64().unwrap_or_default();
    ::metrics::gauge!(metric.name(), "mode" => mode.as_str()).set(value);
}

/// Record a gateway call latency
pub fn record_latency(operation: &'static str, duration: Duration) {
    ::metrics::histogram!("trailguard_gateway_latency_ms", "op" => operation)
        .record(duration.as_secs_f64() * 1000.0);
}
