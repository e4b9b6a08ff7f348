//! Validated trading opportunities
//!
//! Opportunities are produced by the analysis service and consumed read-only
//! by the coordinator, which moves them through their status lifecycle.

mod types;

pub use types::{Assessment, Opportunity, OpportunityId, OpportunityStatus};
