use crate::bot::{Bot, BotId, UserId};
use chrono::{DateTime, Utc};
use ladder_execution::model::{ExchangePair, OrderKind, Side, Symbol, TxId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct OrderId(SmolStr);

impl OrderId {
    pub fn generate() -> Self {
        Self(SmolStr::new(format!("ord_{}", Uuid::new_v4().simple())))
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Queue-row state machine.
///
/// `Pending` and `Retry` rows are claimable once due; `Processing` rows are
/// owned by exactly one executor pass; `Completed` and `Failed` are terminal.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Retry,
}

impl QueueStatus {
    /// Counts against the one-in-flight-order-per-side invariant.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            QueueStatus::Pending | QueueStatus::Processing | QueueStatus::Retry
        )
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
            QueueStatus::Retry => "retry",
        };
        f.write_str(name)
    }
}

/// One recorded fault in an order's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderError {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// A persisted intent that something should be sent to the exchange; the
/// queue row the executor acts on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub id: OrderId,
    pub bot_id: BotId,
    pub user_id: UserId,
    pub symbol: Symbol,

    /// Venue pair the order will be submitted against.
    pub pair: ExchangePair,

    pub side: Side,
    pub kind: OrderKind,

    /// Base units, precision-adjusted by the scheduler.
    pub volume: Decimal,

    /// Limit price; `None` for market orders.
    pub price: Option<Decimal>,

    pub status: QueueStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub next_retry_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub last_error: Option<String>,
    pub errors: Vec<OrderError>,

    /// Venue transaction id once the order has been accepted.
    pub txid: Option<TxId>,
}

impl PendingOrder {
    pub fn new(
        bot: &Bot,
        pair: ExchangePair,
        side: Side,
        kind: OrderKind,
        volume: Decimal,
        price: Option<Decimal>,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::generate(),
            bot_id: bot.id.clone(),
            user_id: bot.user_id.clone(),
            symbol: bot.config.symbol.clone(),
            pair,
            side,
            kind,
            volume,
            price,
            status: QueueStatus::Pending,
            attempts: 0,
            max_attempts,
            next_retry_at: now,
            created_at: now,
            updated_at: now,
            last_error: None,
            errors: Vec::new(),
            txid: None,
        }
    }

    /// Append to the error history and update the last-error shorthand.
    pub fn record_error<S: Into<String>>(&mut self, message: S, now: DateTime<Utc>) {
        let message = message.into();
        self.last_error = Some(message.clone());
        self.errors.push(OrderError { at: now, message });
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_statuses() {
        assert!(QueueStatus::Pending.is_in_flight());
        assert!(QueueStatus::Processing.is_in_flight());
        assert!(QueueStatus::Retry.is_in_flight());
        assert!(!QueueStatus::Completed.is_in_flight());
        assert!(!QueueStatus::Failed.is_in_flight());
    }
}
