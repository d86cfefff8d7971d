use super::{ExchangePair, OrderKind, Side, TxId};
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Order submission payload in venue-pair terms.
///
/// `volume` is base units, already precision-adjusted by the caller; the
/// venue client applies its own final clamp on sells (fee buffer) before
/// transmission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Constructor)]
pub struct OrderRequest {
    pub pair: ExchangePair,
    pub side: Side,
    pub kind: OrderKind,
    pub volume: Decimal,
    pub price: Option<Decimal>,
}

/// Venue acceptance of a submitted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Constructor)]
pub struct OrderAck {
    pub txid: TxId,
    pub accepted_at: DateTime<Utc>,
}

/// Terminal-or-not state of an order as reported by the venue.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeOrderStatus {
    Open,
    Closed,
    Canceled,
    Expired,
}

impl ExchangeOrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExchangeOrderStatus::Open)
    }
}

/// Result of querying a submitted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Constructor)]
pub struct OrderReport {
    pub status: ExchangeOrderStatus,
    pub executed_volume: Decimal,
    pub cost: Decimal,
    pub fee: Decimal,
}

/// Truncate a base-unit volume to the venue's decimal precision.
///
/// Truncation (never rounding up) so an adjusted sell can not exceed the
/// available balance.
pub fn truncate_to_precision(volume: Decimal, decimals: u32) -> Decimal {
    volume.round_dp_with_strategy(decimals, RoundingStrategy::ToZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_truncate_to_precision_never_rounds_up() {
        assert_eq!(truncate_to_precision(dec!(0.123456789), 8), dec!(0.12345678));
        assert_eq!(truncate_to_precision(dec!(0.999999999), 8), dec!(0.99999999));
        assert_eq!(truncate_to_precision(dec!(5.19), 0), dec!(5));
    }

    #[test]
    fn test_truncate_to_precision_is_idempotent() {
        let once = truncate_to_precision(dec!(0.00060279), 8);
        assert_eq!(truncate_to_precision(once, 8), once);
    }

    #[test]
    fn test_exchange_order_status_terminality() {
        assert!(!ExchangeOrderStatus::Open.is_terminal());
        assert!(ExchangeOrderStatus::Closed.is_terminal());
        assert!(ExchangeOrderStatus::Canceled.is_terminal());
        assert!(ExchangeOrderStatus::Expired.is_terminal());
    }
}
