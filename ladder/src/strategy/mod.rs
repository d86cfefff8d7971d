use crate::{
    bot::{Bot, BotStatus},
    config::StrategyConfig,
    market::{MarketSnapshot, Recommendation},
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::{Decimal, MathematicalOps};

/// Decision reasons, also used as run-summary counters. Stable strings so
/// operators can aggregate across runs.
pub mod reason {
    pub const NO_MARKET_DATA: &str = "no market data";
    pub const BOT_NOT_ACTIVE: &str = "bot not active";
    pub const ENTRY_SIGNAL: &str = "entry conditions met";
    pub const MAX_ENTRIES: &str = "max entries reached";
    pub const TREND_NOT_BULLISH: &str = "trend not bullish";
    pub const AWAITING_SUPPORT: &str = "awaiting support cross";
    pub const AWAITING_STEP: &str = "awaiting step price";
    pub const RE_ENTRY_DELAY: &str = "re-entry delay";
    pub const TAKE_PROFIT: &str = "take profit reached";
    pub const TREND_TURNED: &str = "trend turned at take profit";
    pub const TRAILING_STOP: &str = "trailing stop at take profit";
    pub const RIDING_TREND: &str = "riding trend above take profit";
    pub const AWAITING_TP: &str = "awaiting take profit";
}

/// Advisory verdict for one bot against one market snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Enter {
        /// Quote currency to spend.
        amount: Decimal,
        reason: &'static str,
    },
    Exit {
        /// Fraction of current holdings to sell.
        fraction: Decimal,
        reason: &'static str,
    },
    Hold {
        reason: &'static str,
    },
}

impl Decision {
    pub fn is_enter(&self) -> bool {
        matches!(self, Decision::Enter { .. })
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, Decision::Exit { .. })
    }

    pub fn is_hold(&self) -> bool {
        matches!(self, Decision::Hold { .. })
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Decision::Enter { reason, .. }
            | Decision::Exit { reason, .. }
            | Decision::Hold { reason } => reason,
        }
    }
}

/// Pure decision function: `(BotConfig, BotState, MarketSnapshot, now)` in,
/// [`Decision`] out. No IO, no clocks, no mutation - the same inputs always
/// produce the same decision.
///
/// Exit is evaluated before entry, so the two can never both fire.
#[derive(Debug, Clone, Default)]
pub struct StrategyEngine {
    config: StrategyConfig,
}

impl StrategyEngine {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(
        &self,
        bot: &Bot,
        snapshot: Option<&MarketSnapshot>,
        now: DateTime<Utc>,
    ) -> Decision {
        if bot.status != BotStatus::Active {
            return Decision::Hold {
                reason: reason::BOT_NOT_ACTIVE,
            };
        }

        // Stale data is no data
        let Some(snapshot) =
            snapshot.filter(|snapshot| snapshot.is_fresh(self.config.stale_threshold(), now))
        else {
            return Decision::Hold {
                reason: reason::NO_MARKET_DATA,
            };
        };

        let price = snapshot.price;
        if price <= Decimal::ZERO {
            return Decision::Hold {
                reason: reason::NO_MARKET_DATA,
            };
        }

        // Exit wins over entry by construction: evaluated first, and an
        // above-TP price can never satisfy a below-average step price
        if bot.current_entry_count >= 1 && bot.total_volume > Decimal::ZERO {
            if let Some(decision) = self.evaluate_exit(bot, snapshot, price) {
                return decision;
            }
        }

        self.evaluate_entry(bot, snapshot, price, now)
    }

    fn evaluate_exit(
        &self,
        bot: &Bot,
        snapshot: &MarketSnapshot,
        price: Decimal,
    ) -> Option<Decision> {
        let tp_price = bot.tp_price()?;
        if price < tp_price {
            return None;
        }

        let exit = |reason: &'static str| {
            Some(Decision::Exit {
                fraction: bot.config.exit_percent,
                reason,
            })
        };

        if !bot.config.trend_alignment_enabled {
            return exit(reason::TAKE_PROFIT);
        }
        if snapshot.recommendation != Recommendation::Bullish {
            return exit(reason::TREND_TURNED);
        }

        // Trailing-stop-to-min-TP: ride a bullish run, but cash out once the
        // price falls back into the epsilon band just above the TP
        let epsilon_band =
            tp_price * (Decimal::ONE + self.config.retrace_epsilon_percent / Decimal::ONE_HUNDRED);
        let retraced = bot
            .max_price_since_tp
            .is_some_and(|max| max > price && price <= epsilon_band);
        if retraced {
            return exit(reason::TRAILING_STOP);
        }

        Some(Decision::Hold {
            reason: reason::RIDING_TREND,
        })
    }

    fn evaluate_entry(
        &self,
        bot: &Bot,
        snapshot: &MarketSnapshot,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Decision {
        let config = &bot.config;

        if bot.current_entry_count >= config.re_entry_count {
            return Decision::Hold {
                reason: if bot.total_volume > Decimal::ZERO {
                    reason::AWAITING_TP
                } else {
                    reason::MAX_ENTRIES
                },
            };
        }

        if bot.current_entry_count >= 1 {
            // Re-entry price gate: the required drop grows with each entry
            let Some(last_entry_price) = bot.last_entry_price else {
                return Decision::Hold {
                    reason: reason::AWAITING_STEP,
                };
            };

            if let Some(last_entry_time) = bot.last_entry_time {
                let delay = ChronoDuration::minutes(config.re_entry_delay_minutes);
                if now - last_entry_time < delay {
                    return Decision::Hold {
                        reason: reason::RE_ENTRY_DELAY,
                    };
                }
            }

            let next_step_pct = config.step_percent
                * config
                    .step_multiplier
                    .powi(i64::from(bot.current_entry_count - 1));
            let required_price =
                last_entry_price * (Decimal::ONE - next_step_pct / Decimal::ONE_HUNDRED);
            if price > required_price {
                return Decision::Hold {
                    reason: reason::AWAITING_STEP,
                };
            }
        }

        if config.trend_alignment_enabled {
            let aligned = snapshot.recommendation == Recommendation::Bullish
                && snapshot.trend_score >= 50.0
                && snapshot.technical_score >= 50.0;
            if !aligned {
                return Decision::Hold {
                    reason: reason::TREND_NOT_BULLISH,
                };
            }
        }

        if config.support_resistance_enabled {
            let below_support = snapshot
                .support
                .is_some_and(|support| price <= support);
            if !below_support {
                return Decision::Hold {
                    reason: reason::AWAITING_SUPPORT,
                };
            }
        }

        let amount = config.initial_order_amount
            * config
                .trade_multiplier
                .powi(i64::from(bot.current_entry_count));

        Decision::Enter {
            amount,
            reason: reason::ENTRY_SIGNAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::{BotConfig, BotId, UserId};
    use ladder_execution::model::Symbol;
    use rust_decimal_macros::dec;

    fn config() -> BotConfig {
        BotConfig {
            symbol: Symbol::new("BTC", "USD"),
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
        }
    }

    fn bot_with(config: BotConfig, now: DateTime<Utc>) -> Bot {
        Bot::new(BotId::generate(), UserId::new("u1"), config, now)
    }

    fn snapshot(
        price: Decimal,
        trend: f64,
        tech: f64,
        recommendation: Recommendation,
        now: DateTime<Utc>,
    ) -> MarketSnapshot {
        MarketSnapshot {
            symbol: Symbol::new("BTC", "USD"),
            price,
            trend_score: trend,
            technical_score: tech,
            recommendation,
            support: None,
            resistance: None,
            updated_at: now,
        }
    }

    fn engine() -> StrategyEngine {
        StrategyEngine::new(StrategyConfig::default())
    }

    #[test]
    fn test_first_entry_with_bullish_trend() {
        // S1: bullish snapshot clears every first-entry gate
        let now = Utc::now();
        let bot = bot_with(config(), now);
        let snapshot = snapshot(dec!(50000), 72.0, 68.0, Recommendation::Bullish, now);

        let decision = engine().evaluate(&bot, Some(&snapshot), now);
        assert_eq!(
            decision,
            Decision::Enter {
                amount: dec!(10),
                reason: reason::ENTRY_SIGNAL
            }
        );
    }

    #[test]
    fn test_first_entry_blocked_by_neutral_trend() {
        // S2: neutral recommendation with a weak trend score holds
        let now = Utc::now();
        let bot = bot_with(config(), now);
        let snapshot = snapshot(dec!(50000), 49.0, 68.0, Recommendation::Neutral, now);

        let decision = engine().evaluate(&bot, Some(&snapshot), now);
        assert_eq!(
            decision,
            Decision::Hold {
                reason: reason::TREND_NOT_BULLISH
            }
        );
    }

    #[test]
    fn test_trend_gate_requires_both_scores() {
        let now = Utc::now();
        let bot = bot_with(config(), now);

        let weak_trend = snapshot(dec!(50000), 49.0, 68.0, Recommendation::Bullish, now);
        assert!(engine().evaluate(&bot, Some(&weak_trend), now).is_hold());

        let weak_tech = snapshot(dec!(50000), 72.0, 49.0, Recommendation::Bullish, now);
        assert!(engine().evaluate(&bot, Some(&weak_tech), now).is_hold());
    }

    #[test]
    fn test_first_entry_support_gate() {
        let now = Utc::now();
        let mut cfg = config();
        cfg.support_resistance_enabled = true;
        let bot = bot_with(cfg, now);

        let mut above_support = snapshot(dec!(50000), 72.0, 68.0, Recommendation::Bullish, now);
        above_support.support = Some(dec!(49000));
        assert_eq!(
            engine().evaluate(&bot, Some(&above_support), now),
            Decision::Hold {
                reason: reason::AWAITING_SUPPORT
            }
        );

        let mut at_support = snapshot(dec!(48900), 72.0, 68.0, Recommendation::Bullish, now);
        at_support.support = Some(dec!(49000));
        assert!(engine().evaluate(&bot, Some(&at_support), now).is_enter());
    }

    #[test]
    fn test_re_entry_price_gate() {
        // S3: after a 50000 fill, required price is 49500
        let now = Utc::now();
        let mut bot = bot_with(config(), now);
        bot.record_entry_fill(dec!(10), dec!(50000), dec!(0.0002), now);

        let too_high = snapshot(dec!(49700), 72.0, 68.0, Recommendation::Bullish, now);
        assert_eq!(
            engine().evaluate(&bot, Some(&too_high), now),
            Decision::Hold {
                reason: reason::AWAITING_STEP
            }
        );

        let deep_enough = snapshot(dec!(49400), 72.0, 68.0, Recommendation::Bullish, now);
        assert_eq!(
            engine().evaluate(&bot, Some(&deep_enough), now),
            Decision::Enter {
                amount: dec!(20),
                reason: reason::ENTRY_SIGNAL
            }
        );
    }

    #[test]
    fn test_re_entry_step_grows_with_entry_count() {
        // Third entry: step = 1% x 2^1 = 2% below the last fill at 49400
        let now = Utc::now();
        let mut bot = bot_with(config(), now);
        bot.record_entry_fill(dec!(10), dec!(50000), dec!(0.0002), now);
        bot.record_entry_fill(dec!(20), dec!(49400), dec!(0.00040486), now);

        let required = dec!(49400) * (Decimal::ONE - dec!(0.02));
        let just_above = snapshot(required + dec!(1), 72.0, 68.0, Recommendation::Bullish, now);
        assert!(engine().evaluate(&bot, Some(&just_above), now).is_hold());

        let at_step = snapshot(required, 72.0, 68.0, Recommendation::Bullish, now);
        assert_eq!(
            engine().evaluate(&bot, Some(&at_step), now),
            Decision::Enter {
                amount: dec!(40),
                reason: reason::ENTRY_SIGNAL
            }
        );
    }

    #[test]
    fn test_re_entry_delay_gate() {
        let now = Utc::now();
        let mut cfg = config();
        cfg.re_entry_delay_minutes = 30;
        let mut bot = bot_with(cfg, now);
        bot.record_entry_fill(dec!(10), dec!(50000), dec!(0.0002), now);

        let deep = snapshot(dec!(49000), 72.0, 68.0, Recommendation::Bullish, now);
        assert_eq!(
            engine().evaluate(&bot, Some(&deep), now + ChronoDuration::minutes(10)),
            Decision::Hold {
                reason: reason::RE_ENTRY_DELAY
            }
        );
        assert!(
            engine()
                .evaluate(&bot, Some(&deep), now + ChronoDuration::minutes(31))
                .is_enter()
        );
    }

    #[test]
    fn test_exit_at_tp_with_trend_turning() {
        // S4: two fills, avg 49666.67, tp about 51156.67, bearish above it
        let now = Utc::now();
        let mut bot = bot_with(config(), now);
        bot.record_entry_fill(dec!(10), dec!(50000), dec!(0.0002), now);
        bot.record_entry_fill(dec!(20), dec!(49500), dec!(0.000404), now);

        let snapshot = snapshot(dec!(51300), 40.0, 45.0, Recommendation::Bearish, now);
        let decision = engine().evaluate(&bot, Some(&snapshot), now);
        assert_eq!(
            decision,
            Decision::Exit {
                fraction: dec!(1),
                reason: reason::TREND_TURNED
            }
        );
    }

    #[test]
    fn test_exit_without_trend_alignment_fires_at_tp() {
        let now = Utc::now();
        let mut cfg = config();
        cfg.trend_alignment_enabled = false;
        let mut bot = bot_with(cfg, now);
        bot.record_entry_fill(dec!(10), dec!(50000), dec!(0.0002), now);

        let at_tp = snapshot(dec!(51500), 72.0, 68.0, Recommendation::Bullish, now);
        assert_eq!(
            engine().evaluate(&bot, Some(&at_tp), now),
            Decision::Exit {
                fraction: dec!(1),
                reason: reason::TAKE_PROFIT
            }
        );

        let below_tp = snapshot(dec!(51499), 72.0, 68.0, Recommendation::Bullish, now);
        assert!(!engine().evaluate(&bot, Some(&below_tp), now).is_exit());
    }

    #[test]
    fn test_bullish_run_rides_then_trails_out() {
        let now = Utc::now();
        let mut bot = bot_with(config(), now);
        bot.record_entry_fill(dec!(10), dec!(50000), dec!(0.0002), now);
        // tp = 51500, epsilon band ends at 51628.75

        // First touch above TP with a bullish trend: keep riding
        let first_touch = snapshot(dec!(51600), 72.0, 68.0, Recommendation::Bullish, now);
        assert_eq!(
            engine().evaluate(&bot, Some(&first_touch), now),
            Decision::Hold {
                reason: reason::RIDING_TREND
            }
        );

        // Price ran to 52100 (tracked by the scheduler), then fell back into
        // the epsilon band above TP
        bot.max_price_since_tp = Some(dec!(52100));
        let retraced = snapshot(dec!(51600), 72.0, 68.0, Recommendation::Bullish, now);
        assert_eq!(
            engine().evaluate(&bot, Some(&retraced), now),
            Decision::Exit {
                fraction: dec!(1),
                reason: reason::TRAILING_STOP
            }
        );

        // Still far above the band: keep riding even off the high
        let still_high = snapshot(dec!(52000), 72.0, 68.0, Recommendation::Bullish, now);
        assert_eq!(
            engine().evaluate(&bot, Some(&still_high), now),
            Decision::Hold {
                reason: reason::RIDING_TREND
            }
        );
    }

    #[test]
    fn test_stale_snapshot_holds() {
        let now = Utc::now();
        let bot = bot_with(config(), now);
        let stale = snapshot(
            dec!(50000),
            72.0,
            68.0,
            Recommendation::Bullish,
            now - ChronoDuration::minutes(4),
        );

        assert_eq!(
            engine().evaluate(&bot, Some(&stale), now),
            Decision::Hold {
                reason: reason::NO_MARKET_DATA
            }
        );
        assert_eq!(
            engine().evaluate(&bot, None, now),
            Decision::Hold {
                reason: reason::NO_MARKET_DATA
            }
        );
    }

    #[test]
    fn test_zero_volume_never_exits() {
        // Division guard: aggregates forced inconsistent still cannot exit
        let now = Utc::now();
        let mut bot = bot_with(config(), now);
        bot.current_entry_count = 1;
        bot.total_volume = Decimal::ZERO;
        bot.average_entry_price = Decimal::ZERO;

        let high = snapshot(dec!(99999), 72.0, 68.0, Recommendation::Bearish, now);
        let decision = engine().evaluate(&bot, Some(&high), now);
        assert!(!decision.is_exit());
    }

    #[test]
    fn test_max_entries_reached_awaits_tp() {
        let now = Utc::now();
        let mut cfg = config();
        cfg.re_entry_count = 1;
        let mut bot = bot_with(cfg, now);
        bot.record_entry_fill(dec!(10), dec!(50000), dec!(0.0002), now);

        let low = snapshot(dec!(48000), 72.0, 68.0, Recommendation::Bullish, now);
        assert_eq!(
            engine().evaluate(&bot, Some(&low), now),
            Decision::Hold {
                reason: reason::AWAITING_TP
            }
        );
    }

    #[test]
    fn test_paused_bot_holds() {
        let now = Utc::now();
        let mut bot = bot_with(config(), now);
        bot.status = BotStatus::Paused;
        let snapshot = snapshot(dec!(50000), 72.0, 68.0, Recommendation::Bullish, now);

        assert_eq!(
            engine().evaluate(&bot, Some(&snapshot), now),
            Decision::Hold {
                reason: reason::BOT_NOT_ACTIVE
            }
        );
    }

    #[test]
    fn test_decision_is_deterministic() {
        // L2: identical inputs, identical decisions
        let now = Utc::now();
        let mut bot = bot_with(config(), now);
        bot.record_entry_fill(dec!(10), dec!(50000), dec!(0.0002), now);
        let snapshot = snapshot(dec!(49400), 72.0, 68.0, Recommendation::Bullish, now);

        let first = engine().evaluate(&bot, Some(&snapshot), now);
        for _ in 0..10 {
            assert_eq!(engine().evaluate(&bot, Some(&snapshot), now), first);
        }
    }
}
