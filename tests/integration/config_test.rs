//! Shipped configuration

use rust_decimal_macros::dec;
use trailguard::config::{Config, ExitStrategyKind};

#[test]
fn test_config_example_loads() {
    let config = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml.example")).unwrap();
    assert_eq!(config.risk.real_trade_ceiling, 5);
    assert_eq!(config.risk.real_confidence_threshold, dec!(0.95));
    assert_eq!(config.exit.strategy, ExitStrategyKind::Fixed);
    assert_eq!(config.symbol_rules("BTCUSDT").slippage_bps, dec!(2));
    assert_eq!(config.symbol_rules("SOLUSDT").lot_step, dec!(0.001));
    assert!(config.notify.webhook_url.is_none());
}

#[test]
fn test_effective_config_round_trips() {
    let config = Config::default();
    let rendered = toml::to_string_pretty(&config).unwrap();
    let parsed = Config::parse(&rendered).unwrap();
    assert_eq!(parsed.risk.daily_capital_risk_pct, config.risk.daily_capital_risk_pct);
    assert_eq!(parsed.monitor.stale_after_secs, config.monitor.stale_after_secs);
}
