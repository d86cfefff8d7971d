use super::{MarketSnapshot, MarketView, analysis::AnalysisProvider};
use crate::{clock::Clock, config::RefresherConfig, error::EngineError, ledger::Ledger};
use ladder_execution::{client::ExchangeClient, model::Symbol};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Outcome counters of one refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub failed: usize,
}

/// Periodic worker maintaining the [`MarketView`] for every symbol an active
/// bot watches. A failing symbol never aborts the pass.
#[derive(Debug)]
pub struct MarketDataRefresher {
    ledger: Arc<Ledger>,
    market: Arc<MarketView>,
    exchange: Arc<dyn ExchangeClient>,
    analysis: Arc<dyn AnalysisProvider>,
    config: RefresherConfig,
    clock: Arc<dyn Clock>,
}

impl MarketDataRefresher {
    pub fn new(
        ledger: Arc<Ledger>,
        market: Arc<MarketView>,
        exchange: Arc<dyn ExchangeClient>,
        analysis: Arc<dyn AnalysisProvider>,
        config: RefresherConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            market,
            exchange,
            analysis,
            config,
            clock,
        }
    }

    /// Run the periodic refresh loop until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.period());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let summary = self.refresh().await;
                    debug!(refreshed = summary.refreshed, failed = summary.failed, "market refresh pass");
                }
                _ = shutdown.changed() => {
                    info!("market data refresher shutting down");
                    break;
                }
            }
        }
    }

    /// One bounded refresh pass over the distinct symbols of active bots.
    pub async fn refresh(&self) -> RefreshSummary {
        let mut summary = RefreshSummary::default();
        for symbol in self.ledger.active_symbols() {
            match self.refresh_symbol(&symbol).await {
                Ok(()) => summary.refreshed += 1,
                Err(error) => {
                    summary.failed += 1;
                    warn!(%symbol, %error, "symbol refresh failed");
                }
            }
        }
        summary
    }

    async fn refresh_symbol(&self, symbol: &Symbol) -> Result<(), EngineError> {
        let pair = self.exchange.normalize_pair(symbol)?;
        let ticker = self.exchange.fetch_ticker(&pair).await?;
        let candles = self
            .exchange
            .fetch_ohlc(&pair, self.config.ohlc_interval_minutes)
            .await?;
        let analysis = self.analysis.analyse(symbol, &candles).await?;

        self.market.put(MarketSnapshot {
            symbol: symbol.clone(),
            price: ticker.last,
            trend_score: analysis.trend_score,
            technical_score: analysis.technical_score,
            recommendation: analysis.recommendation,
            support: analysis.support,
            resistance: analysis.resistance,
            updated_at: self.clock.now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bot::{Bot, BotConfig, BotId, UserId},
        clock::FixedClock,
        market::analysis::IndicatorAnalysis,
    };
    use chrono::Utc;
    use ladder_execution::{
        client::mock::MockExchange,
        model::{ExchangePair, market::{Candle, Ticker}},
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn bot(symbol: &str) -> Bot {
        let config = BotConfig {
            symbol: symbol.parse().unwrap(),
            initial_order_amount: dec!(10),
            trade_multiplier: dec!(2),
            re_entry_count: 8,
            step_percent: dec!(1),
            step_multiplier: dec!(2),
            tp_target: dec!(3),
            exit_percent: dec!(1),
            support_resistance_enabled: false,
            trend_alignment_enabled: true,
            re_entry_delay_minutes: 0,
        };
        Bot::new(BotId::generate(), UserId::new("u1"), config, Utc::now())
    }

    fn rising_candles() -> Vec<Candle> {
        (0..40)
            .map(|n| {
                let close = Decimal::from(50_000 + n * 25);
                Candle {
                    time: Utc::now(),
                    open: close,
                    high: close + dec!(10),
                    low: close - dec!(10),
                    close,
                    vwap: close,
                    volume: dec!(1),
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_refresh_populates_view_and_isolates_failures() {
        let ledger = Arc::new(Ledger::new());
        ledger.insert_bot(bot("BTC/USD")).unwrap();
        ledger.insert_bot(bot("ETH/USD")).unwrap();

        let exchange = Arc::new(MockExchange::new());
        // Only BTC has a ticker scripted; ETH will fail
        exchange.set_ticker(
            ExchangePair::new("XXBTZUSD"),
            Ticker {
                last: dec!(50975),
                bid: dec!(50970),
                ask: dec!(50980),
                time: Utc::now(),
            },
        );
        exchange.set_candles(ExchangePair::new("XXBTZUSD"), rising_candles());

        let market = Arc::new(MarketView::new());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let refresher = MarketDataRefresher::new(
            ledger,
            Arc::clone(&market),
            exchange,
            Arc::new(IndicatorAnalysis::default()),
            RefresherConfig::default(),
            clock,
        );

        let summary = refresher.refresh().await;
        assert_eq!(summary, RefreshSummary { refreshed: 1, failed: 1 });

        let snapshot = market.get(&"BTC/USD".parse().unwrap()).unwrap();
        assert_eq!(snapshot.price, dec!(50975));
        assert!(snapshot.trend_score > 50.0);
        assert!(market.get(&"ETH/USD".parse().unwrap()).is_none());
    }
}
