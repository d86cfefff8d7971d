use super::CycleId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Archived summary of a closed cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle_id: CycleId,
    pub cycle_number: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,

    /// Quote currency spent on the cycle's entries.
    pub invested: Decimal,

    /// Gross proceeds of the exit sell.
    pub recovered: Decimal,

    /// `recovered - invested`.
    pub realized_pnl: Decimal,
}
