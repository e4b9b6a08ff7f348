//! Notification types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    OpportunityRejected,
    TradeOpened,
    TradeClosed,
    TradeFailed,
    ExitCoverageMissing,
    ExitUnconfirmed,
    StaleFeed,
    WatcherRestarted,
    WatcherAbandoned,
}

/// Delivery priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// One event handed to the notification service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub event_type: EventType,
    pub severity: Severity,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(event_type: EventType, severity: Severity, payload: serde_json::Value) -> Self {
        Self {
            event_type,
            severity,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn info(event_type: EventType, payload: serde_json::Value) -> Self {
        Self::new(event_type, Severity::Info, payload)
    }

    pub fn warning(event_type: EventType, payload: serde_json::Value) -> Self {
        Self::new(event_type, Severity::Warning, payload)
    }

    pub fn critical(event_type: EventType, payload: serde_json::Value) -> Self {
        Self::new(event_type, Severity::Critical, payload)
    }
}
