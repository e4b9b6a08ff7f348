//! Configuration types for trailguard

use crate::telemetry::LogFormat;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Key of the fallback entry in `[symbols]`
pub const DEFAULT_SYMBOL_KEY: &str = "default";

/// Configuration validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("daily_capital_risk_pct must be in (0, 1], got {0}")]
    DailyRiskOutOfRange(Decimal),
    #[error("per_trade_risk_pct must be in (0, daily_capital_risk_pct], got {0}")]
    PerTradeRiskOutOfRange(Decimal),
    #[error("confidence threshold must be in [0, 1], got {0}")]
    ThresholdOutOfRange(Decimal),
    #[error("lot_step for {0} must be positive")]
    InvalidLotStep(String),
    #[error("exit {0} must be in (0, 1)")]
    ExitPctOutOfRange(&'static str),
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub exit: ExitConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    /// Per-symbol exchange metadata, with a `default` fallback entry
    #[serde(default)]
    pub symbols: HashMap<String, SymbolRules>,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// User-set risk invariants
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RiskConfig {
    /// Share of balance that may be put at risk per trading day
    #[serde(default = "default_daily_risk_pct")]
    pub daily_capital_risk_pct: Decimal,

    /// Share of balance that may be put into a single trade
    #[serde(default = "default_per_trade_risk_pct")]
    pub per_trade_risk_pct: Decimal,

    /// Maximum number of real trades ever opened
    #[serde(default = "default_real_trade_ceiling")]
    pub real_trade_ceiling: u32,

    /// Confidence must exceed this for paper trades
    #[serde(default = "default_paper_threshold")]
    pub paper_confidence_threshold: Decimal,

    /// Confidence must exceed this for real trades
    #[serde(default = "default_real_threshold")]
    pub real_confidence_threshold: Decimal,

    /// Hour (UTC) at which the daily risk counter resets
    #[serde(default)]
    pub day_boundary_hour_utc: u32,
}

fn default_daily_risk_pct() -> Decimal {
    dec!(0.50)
}
fn default_per_trade_risk_pct() -> Decimal {
    dec!(0.25)
}
fn default_real_trade_ceiling() -> u32 {
    5
}
fn default_paper_threshold() -> Decimal {
    dec!(0.80)
}
fn default_real_threshold() -> Decimal {
    dec!(0.95)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            daily_capital_risk_pct: default_daily_risk_pct(),
            per_trade_risk_pct: default_per_trade_risk_pct(),
            real_trade_ceiling: default_real_trade_ceiling(),
            paper_confidence_threshold: default_paper_threshold(),
            real_confidence_threshold: default_real_threshold(),
            day_boundary_hour_utc: 0,
        }
    }
}

impl RiskConfig {
    /// Reject out-of-range percentages
    pub fn validate(&self) -> Result<(), ConfigError> {
        let daily = self.daily_capital_risk_pct;
        if daily <= Decimal::ZERO || daily > Decimal::ONE {
            return Err(ConfigError::DailyRiskOutOfRange(daily));
        }
        let per_trade = self.per_trade_risk_pct;
        if per_trade <= Decimal::ZERO || per_trade > daily {
            return Err(ConfigError::PerTradeRiskOutOfRange(per_trade));
        }
        for threshold in [
            self.paper_confidence_threshold,
            self.real_confidence_threshold,
        ] {
            if threshold < Decimal::ZERO || threshold > Decimal::ONE {
                return Err(ConfigError::ThresholdOutOfRange(threshold));
            }
        }
        Ok(())
    }

    /// Confidence threshold for a mode
    pub fn confidence_threshold(&self, mode: crate::trade::TradeMode) -> Decimal {
        match mode {
            crate::trade::TradeMode::Paper => self.paper_confidence_threshold,
            crate::trade::TradeMode::Real => self.real_confidence_threshold,
        }
    }
}

/// Starting balances used when no ledger snapshot has been persisted yet
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub paper_balance: Decimal,
    pub real_balance: Decimal,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            paper_balance: dec!(10000),
            real_balance: dec!(0),
        }
    }
}

/// How initial exit offsets are derived
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExitStrategyKind {
    /// Fixed percentage offsets from entry
    #[default]
    Fixed,
    /// Offsets scaled from the recent realized high/low range
    RealizedRange,
}

/// Exit strategy parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExitConfig {
    pub strategy: ExitStrategyKind,
    /// Initial stop distance from entry
    pub stop_pct: Decimal,
    /// Take-profit distance from entry
    pub take_profit_pct: Decimal,
    /// Trailing callback distance
    pub callback_rate: Decimal,
    /// Favourable move required before the stop trails (0 = immediately)
    pub activation_pct: Decimal,
    /// Gap between stop trigger and stop-limit price
    pub stop_limit_offset_pct: Decimal,
    /// Stop distance as a multiple of realized range
    pub range_stop_multiple: Decimal,
    /// Take-profit distance as a multiple of realized range
    pub range_take_profit_multiple: Decimal,
    /// Replace the exchange-side exit pair when the stop trails
    pub replace_on_trail: bool,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            strategy: ExitStrategyKind::Fixed,
            stop_pct: dec!(0.05),
            take_profit_pct: dec!(0.10),
            callback_rate: dec!(0.05),
            activation_pct: dec!(0),
            stop_limit_offset_pct: dec!(0.001),
            range_stop_multiple: dec!(1.5),
            range_take_profit_multiple: dec!(3),
            replace_on_trail: true,
        }
    }
}

impl ExitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_unit = |v: Decimal| v > Decimal::ZERO && v < Decimal::ONE;
        if !in_unit(self.stop_pct) {
            return Err(ConfigError::ExitPctOutOfRange("stop_pct"));
        }
        if !in_unit(self.take_profit_pct) {
            return Err(ConfigError::ExitPctOutOfRange("take_profit_pct"));
        }
        if !in_unit(self.callback_rate) {
            return Err(ConfigError::ExitPctOutOfRange("callback_rate"));
        }
        Ok(())
    }
}

/// Retry settings for exit-side gateway calls
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
        }
    }
}

/// Order gateway configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Fee rate charged per fill (fraction of notional)
    pub fee_rate: Decimal,
    pub request_timeout_ms: u64,
    /// Exchange REST base URL for the live gateway
    pub base_url: String,
    pub retry: RetryConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            fee_rate: dec!(0.001),
            request_timeout_ms: 10_000,
            base_url: "https://api.binance.com".to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl ExecutionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Position monitor configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Re-evaluate only when price moved at least this many basis points...
    pub min_move_bps: Decimal,
    /// ...or this much time passed since the last evaluation
    pub min_interval_ms: u64,
    /// Feed silence after which trailing is suspended and an alert raised
    pub stale_after_secs: u64,
    pub restart_backoff_ms: u64,
    /// Crashes tolerated per watcher before it is abandoned for review
    pub max_restarts: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            min_move_bps: dec!(5),
            min_interval_ms: 1_000,
            stale_after_secs: 30,
            restart_backoff_ms: 500,
            max_restarts: 5,
        }
    }
}

impl MonitorConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }
}

/// Market data feed configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    pub symbols: Vec<String>,
    pub poll_interval_ms: u64,
    pub base_url: String,
    /// Window for the realized high/low range
    pub range_window_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string()],
            poll_interval_ms: 1_000,
            base_url: "https://api.binance.com".to_string(),
            range_window_secs: 3_600,
        }
    }
}

/// Exchange metadata for one symbol
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SymbolRules {
    /// Quantity step size
    pub lot_step: Decimal,
    /// Smallest tradable quantity
    pub min_qty: Decimal,
    /// Simulated slippage in basis points
    pub slippage_bps: Decimal,
    /// Price increment accepted by the exchange
    pub tick_size: Decimal,
}

impl Default for SymbolRules {
    fn default() -> Self {
        Self {
            lot_step: dec!(0.00001),
            min_qty: dec!(0.00001),
            slippage_bps: dec!(0),
            tick_size: dec!(0.01),
        }
    }
}

impl SymbolRules {
    /// Look up `symbol` in a rule table, then its `default` entry
    pub fn resolve(table: &HashMap<String, SymbolRules>, symbol: &str) -> SymbolRules {
        table
            .get(symbol)
            .or_else(|| table.get(DEFAULT_SYMBOL_KEY))
            .cloned()
            .unwrap_or_default()
    }
}

/// State store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub dir: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./state"),
        }
    }
}

/// Notification delivery configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_port: Option<u16>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.risk.validate()?;
        self.exit.validate()?;
        for (symbol, rules) in &self.symbols {
            if rules.lot_step <= Decimal::ZERO {
                return Err(ConfigError::InvalidLotStep(symbol.clone()));
            }
        }
        Ok(())
    }

    /// Exchange metadata for `symbol`, falling back to the `default` entry
    pub fn symbol_rules(&self, symbol: &str) -> SymbolRules {
        SymbolRules::resolve(&self.symbols, symbol)
    }
}
