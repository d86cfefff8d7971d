use super::{BotId, CycleId};
use crate::queue::OrderId;
use chrono::{DateTime, Utc};
use ladder_execution::model::TxId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct EntryId(SmolStr);

impl EntryId {
    pub fn generate() -> Self {
        Self(SmolStr::new(format!("entry_{}", Uuid::new_v4().simple())))
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Filled,
    Failed,
}

/// Where an entry originated: placed by this system, or reconciled from the
/// venue's trade history by an external sync job.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    BotExecution,
    ExternalSync,
}

/// A single buy within a cycle. Immutable once `Filled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub bot_id: BotId,
    pub cycle_id: CycleId,
    pub cycle_number: u32,

    /// Dense 1-based position within the cycle.
    pub entry_number: u32,

    /// Quote currency spent, including what the fill actually cost.
    pub order_amount: Decimal,

    /// Effective fill price.
    pub price: Decimal,

    /// Base units bought.
    pub quantity: Decimal,

    /// Venue fee charged on the fill.
    pub fee: Decimal,

    pub timestamp: DateTime<Utc>,
    pub order_id: OrderId,
    pub txid: Option<TxId>,
    pub status: EntryStatus,
    pub source: EntrySource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_source_serialises_snake_case() {
        assert_eq!(
            serde_json::to_string(&EntrySource::BotExecution).unwrap(),
            r#""bot_execution""#
        );
        assert_eq!(
            serde_json::to_string(&EntrySource::ExternalSync).unwrap(),
            r#""external_sync""#
        );
    }
}
