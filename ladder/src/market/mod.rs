use chrono::{DateTime, Duration as ChronoDuration, Utc};
use fnv::FnvHashMap;
use ladder_execution::model::Symbol;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Indicator analysis provider interface and the candle-based default.
pub mod analysis;

/// Periodic worker keeping the view warm.
pub mod refresher;

/// Advisory stance of the analysis provider.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Recommendation::Bullish => "bullish",
            Recommendation::Bearish => "bearish",
            Recommendation::Neutral => "neutral",
        };
        f.write_str(name)
    }
}

/// Last-known market state for one symbol: price plus the indicator bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: Symbol,
    pub price: Decimal,

    /// Trend strength, 0-100.
    pub trend_score: f64,

    /// Technical/momentum strength, 0-100.
    pub technical_score: f64,

    pub recommendation: Recommendation,
    pub support: Option<Decimal>,
    pub resistance: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn is_fresh(&self, stale_threshold: ChronoDuration, now: DateTime<Utc>) -> bool {
        now - self.updated_at <= stale_threshold
    }
}

/// Process-local snapshot cache: many readers, one writer (the refresher).
///
/// Replacement is atomic per symbol; readers always see a complete snapshot
/// or none. This is the only place market data lives for the scheduler.
#[derive(Debug, Default)]
pub struct MarketView {
    inner: RwLock<FnvHashMap<Symbol, MarketSnapshot>>,
}

impl MarketView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, snapshot: MarketSnapshot) {
        self.inner.write().insert(snapshot.symbol.clone(), snapshot);
    }

    /// Latest snapshot regardless of age.
    pub fn get(&self, symbol: &Symbol) -> Option<MarketSnapshot> {
        self.inner.read().get(symbol).cloned()
    }

    /// Latest snapshot, treating anything older than `stale_threshold` as
    /// missing - consumers that require freshness use this.
    pub fn fresh(
        &self,
        symbol: &Symbol,
        stale_threshold: ChronoDuration,
        now: DateTime<Utc>,
    ) -> Option<MarketSnapshot> {
        self.get(symbol)
            .filter(|snapshot| snapshot.is_fresh(stale_threshold, now))
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.inner.read().keys().cloned().collect()
    }
}
