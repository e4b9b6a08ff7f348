//! trailguard: risk-gated order execution and trailing-stop exit management
//!
//! This library provides the core components for:
//! - Gating validated opportunities on confidence, trade ceiling and exchange reachability
//! - Position sizing under daily and per-trade risk budgets
//! - A per-mode capital ledger with daily risk reset
//! - Simulated and live order gateways behind one contract
//! - Trailing-stop and take-profit exit levels
//! - A persisted trade state machine
//! - One supervised watcher per open trade
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod execution;
pub mod exit;
pub mod feed;
pub mod monitor;
pub mod notify;
pub mod opportunity;
pub mod risk;
pub mod store;
pub mod telemetry;
pub mod trade;
pub mod vault;

pub use engine::TradingEngine;
pub use error::{EngineError, GateRejection};
