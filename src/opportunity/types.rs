//! Opportunity types

use crate::trade::{Side, TradeId, TradeMode};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opportunity identifier
pub type OpportunityId = Uuid;

/// Opportunity lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityStatus {
    Pending,
    Accepted,
    Rejected,
    Converted,
}

/// Output of the analysis service for one opportunity payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub suggested_direction: Side,
    /// Probability in [0, 1]
    pub confidence: Decimal,
    pub reasoning: String,
}

/// An externally validated trading signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: OpportunityId,
    pub symbol: String,
    pub direction: Side,
    /// Probability in [0, 1]
    pub confidence: Decimal,
    /// Mode the opportunity is submitted for
    pub mode: TradeMode,
    /// Raw signal payload from the source
    pub payload: serde_json::Value,
    pub status: OpportunityStatus,
    /// Human-readable reason when rejected
    pub reject_reason: Option<String>,
    /// Trade created from this opportunity, for display only
    pub trade_id: Option<TradeId>,
    pub created_at: DateTime<Utc>,
}

impl Opportunity {
    /// Create a pending opportunity
    pub fn new(
        symbol: impl Into<String>,
        direction: Side,
        confidence: Decimal,
        mode: TradeMode,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            direction,
            confidence,
            mode,
            payload: serde_json::Value::Null,
            status: OpportunityStatus::Pending,
            reject_reason: None,
            trade_id: None,
            created_at: Utc::now(),
        }
    }

    /// Build from an analysis result, keeping the source payload
    pub fn from_assessment(
        symbol: impl Into<String>,
        mode: TradeMode,
        payload: serde_json::Value,
        assessment: &Assessment,
    ) -> Self {
        let mut opportunity = Self::new(
            symbol,
            assessment.suggested_direction,
            assessment.confidence,
            mode,
        );
        opportunity.payload = payload;
        opportunity
    }

    pub fn reject(&mut self, reason: impl Into<String>) {
        self.status = OpportunityStatus::Rejected;
        self.reject_reason = Some(reason.into());
    }

    pub fn accept(&mut self) {
        self.status = OpportunityStatus::Accepted;
    }

    pub fn convert(&mut self, trade_id: TradeId) {
        self.status = OpportunityStatus::Converted;
        self.trade_id = Some(trade_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_opportunity_is_pending() {
        let opp = Opportunity::new("ETHUSDT", Side::Long, dec!(0.9), TradeMode::Paper);
        assert_eq!(opp.status, OpportunityStatus::Pending);
        assert!(opp.trade_id.is_none());
        assert!(opp.reject_reason.is_none());
    }

    #[test]
    fn test_from_assessment() {
        let assessment = Assessment {
            suggested_direction: Side::Short,
            confidence: dec!(0.97),
            reasoning: "breakdown below support".to_string(),
        };
        let payload = serde_json::json!({"rsi": 78});
        let opp = Opportunity::from_assessment("SOLUSDT", TradeMode::Real, payload, &assessment);

        assert_eq!(opp.direction, Side::Short);
        assert_eq!(opp.confidence, dec!(0.97));
        assert_eq!(opp.payload["rsi"], 78);
    }

    #[test]
    fn test_status_transitions() {
        let mut opp = Opportunity::new("ETHUSDT", Side::Long, dec!(0.9), TradeMode::Paper);
        opp.accept();
        assert_eq!(opp.status, OpportunityStatus::Accepted);

        let trade_id = Uuid::new_v4();
        opp.convert(trade_id);
        assert_eq!(opp.status, OpportunityStatus::Converted);
        assert_eq!(opp.trade_id, Some(trade_id));
    }

    #[test]
    fn test_reject_records_reason() {
        let mut opp = Opportunity::new("ETHUSDT", Side::Long, dec!(0.5), TradeMode::Paper);
        opp.reject("confidence too low");
        assert_eq!(opp.status, OpportunityStatus::Rejected);
        assert_eq!(opp.reject_reason.as_deref(), Some("confidence too low"));
    }
}
