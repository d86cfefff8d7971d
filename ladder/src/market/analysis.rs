use super::Recommendation;
use async_trait::async_trait;
use ladder_execution::model::{Symbol, market::Candle};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("analysis failed: {0}")]
pub struct AnalysisError(pub String);

/// Indicator bundle produced per symbol on each refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub trend_score: f64,
    pub technical_score: f64,
    pub recommendation: Recommendation,
    pub support: Option<Decimal>,
    pub resistance: Option<Decimal>,
}

/// Produces trend/technical scores from candle history. The production
/// deployment may back this with an external analysis service; the crate
/// ships a candle-based default.
#[async_trait]
pub trait AnalysisProvider: Send + Sync + std::fmt::Debug {
    async fn analyse(&self, symbol: &Symbol, candles: &[Candle]) -> Result<Analysis, AnalysisError>;
}

/// Candle-based default provider.
///
/// Trend score: EMA alignment (fast vs slow) scaled onto 0-100.
/// Technical score: RSI over closes.
/// Support/resistance: extremes of the recent lookback window.
#[derive(Debug, Clone)]
pub struct IndicatorAnalysis {
    pub fast_period: usize,
    pub slow_period: usize,
    pub rsi_period: usize,
    pub extremes_lookback: usize,
}

impl Default for IndicatorAnalysis {
    fn default() -> Self {
        Self {
            fast_period: 10,
            slow_period: 30,
            rsi_period: 14,
            extremes_lookback: 20,
        }
    }
}

#[async_trait]
impl AnalysisProvider for IndicatorAnalysis {
    async fn analyse(&self, symbol: &Symbol, candles: &[Candle]) -> Result<Analysis, AnalysisError> {
        if candles.len() < self.slow_period {
            return Err(AnalysisError(format!(
                "{symbol}: {} candles, need at least {}",
                candles.len(),
                self.slow_period
            )));
        }

        let closes: Vec<Decimal> = candles.iter().map(|candle| candle.close).collect();

        let fast = ema(&closes, self.fast_period);
        let slow = ema(&closes, self.slow_period);
        let spread_pct = if slow > Decimal::ZERO {
            ((fast - slow) / slow * Decimal::ONE_HUNDRED)
                .to_f64()
                .unwrap_or(0.0)
        } else {
            0.0
        };

        // One percent of EMA spread moves the score by twenty points
        let trend_score = (50.0 + spread_pct * 20.0).clamp(0.0, 100.0);
        let technical_score = rsi(&closes, self.rsi_period);

        let recommendation = if trend_score >= 55.0 && technical_score >= 50.0 {
            Recommendation::Bullish
        } else if trend_score <= 45.0 && technical_score <= 50.0 {
            Recommendation::Bearish
        } else {
            Recommendation::Neutral
        };

        let window = &candles[candles.len().saturating_sub(self.extremes_lookback)..];
        let support = window.iter().map(|candle| candle.low).min();
        let resistance = window.iter().map(|candle| candle.high).max();

        Ok(Analysis {
            trend_score,
            technical_score,
            recommendation,
            support,
            resistance,
        })
    }
}

/// Exponential moving average over the full series, seeded with the first
/// value.
fn ema(values: &[Decimal], period: usize) -> Decimal {
    let multiplier = Decimal::from(2u64) / Decimal::from(period as u64 + 1);
    let mut ema = values[0];
    for value in &values[1..] {
        ema = (*value - ema) * multiplier + ema;
    }
    ema
}

/// Relative strength index over the trailing `period` deltas, 0-100.
fn rsi(values: &[Decimal], period: usize) -> f64 {
    if values.len() < period + 1 {
        return 50.0;
    }

    let window = &values[values.len() - period - 1..];
    let mut gains = Decimal::ZERO;
    let mut losses = Decimal::ZERO;
    for pair in window.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > Decimal::ZERO {
            gains += delta;
        } else {
            losses -= delta;
        }
    }

    if losses.is_zero() {
        return 100.0;
    }
    let rs = (gains / losses).to_f64().unwrap_or(1.0);
    100.0 - (100.0 / (1.0 + rs))
}
