use crate::{
    bot::{Bot, BotId, BotStatus},
    clock::Clock,
    config::{EngineConfig, SchedulerConfig},
    credentials::CredentialProvider,
    error::EngineError,
    ledger::{BotExecution, ExecutionAction, Ledger, LedgerError},
    market::MarketView,
    strategy::{Decision, StrategyEngine},
};
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use ladder_execution::{
    client::{ExchangeClient, ExchangeClientFactory},
    model::{OrderKind, order::truncate_to_precision},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// What one scheduler evaluation did with one bot.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotAction {
    Enter,
    Exit,
    Hold,
    Skip,
    Fail,
}

impl From<BotAction> for ExecutionAction {
    fn from(action: BotAction) -> Self {
        match action {
            BotAction::Enter => ExecutionAction::Enter,
            BotAction::Exit => ExecutionAction::Exit,
            BotAction::Hold => ExecutionAction::Hold,
            BotAction::Skip => ExecutionAction::Skip,
            BotAction::Fail => ExecutionAction::Fail,
        }
    }
}

/// Per-bot detail row of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotOutcome {
    pub bot_id: BotId,
    pub action: BotAction,
    pub reason: String,
}

/// Observability record of one bounded scheduler run, persisted via the
/// ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_bots: usize,
    pub processed: usize,
    pub enters: usize,
    pub exits: usize,
    pub holds: usize,
    pub skipped: usize,
    pub failed: usize,
    pub reason_counts: BTreeMap<String, u32>,
    pub details: Vec<BotOutcome>,
}

impl RunSummary {
    fn new(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        total_bots: usize,
        details: Vec<BotOutcome>,
    ) -> Self {
        let mut summary = Self {
            started_at,
            finished_at,
            total_bots,
            processed: details.len(),
            enters: 0,
            exits: 0,
            holds: 0,
            skipped: 0,
            failed: 0,
            reason_counts: BTreeMap::new(),
            details,
        };
        for outcome in &summary.details {
            match outcome.action {
                BotAction::Enter => summary.enters += 1,
                BotAction::Exit => summary.exits += 1,
                BotAction::Hold => summary.holds += 1,
                BotAction::Skip => summary.skipped += 1,
                BotAction::Fail => summary.failed += 1,
            }
            *summary
                .reason_counts
                .entry(outcome.reason.clone())
                .or_default() += 1;
        }
        summary
    }
}

/// Periodic worker sweeping every active bot: evaluate the strategy against
/// the latest market snapshot and turn decisions into order *intents* in the
/// ledger. Never talks to the exchange to trade - the queue executor does.
#[derive(Debug)]
pub struct BotScheduler<Factory: ExchangeClientFactory> {
    ledger: Arc<Ledger>,
    market: Arc<MarketView>,
    strategy: StrategyEngine,
    factory: Arc<Factory>,
    credentials: Arc<dyn CredentialProvider>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    fee_buffer: Decimal,
    max_attempts: u32,
}

impl<Factory> BotScheduler<Factory>
where
    Factory: ExchangeClientFactory,
{
    pub fn new(
        ledger: Arc<Ledger>,
        market: Arc<MarketView>,
        factory: Arc<Factory>,
        credentials: Arc<dyn CredentialProvider>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            ledger,
            market,
            strategy: StrategyEngine::new(config.strategy.clone()),
            factory,
            credentials,
            clock,
            config: config.scheduler.clone(),
            fee_buffer: config.fee_buffer,
            max_attempts: config.executor.max_attempts,
        }
    }

    /// Run the periodic scheduling loop until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.period());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => { self.run_once().await; }
                _ = shutdown.changed() => {
                    info!("bot scheduler shutting down");
                    break;
                }
            }
        }
    }

    /// One bounded run over all active bots.
    pub async fn run_once(&self) -> RunSummary {
        let started_at = self.clock.now();
        let deadline = started_at + self.config.run_timeout();

        let bots = self.ledger.bots_with_status(BotStatus::Active);
        let total_bots = bots.len();

        let details: Vec<BotOutcome> = stream::iter(bots)
            .map(|bot| async move {
                // Past the deadline no further bots are dispatched
                if self.clock.now() >= deadline {
                    let outcome = BotOutcome {
                        bot_id: bot.id.clone(),
                        action: BotAction::Skip,
                        reason: "run timeout".to_string(),
                    };
                    self.audit(&outcome, None);
                    outcome
                } else {
                    self.process_bot(bot).await
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let summary = RunSummary::new(started_at, self.clock.now(), total_bots, details);
        info!(
            total = summary.total_bots,
            enters = summary.enters,
            exits = summary.exits,
            holds = summary.holds,
            skipped = summary.skipped,
            failed = summary.failed,
            "scheduler run complete"
        );
        self.ledger.record_run(summary.clone());
        summary
    }

    async fn process_bot(&self, bot: Bot) -> BotOutcome {
        let price = self.market.get(&bot.config.symbol).map(|snapshot| snapshot.price);
        match self.evaluate_bot(&bot).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(bot = %bot.id, %error, "bot evaluation failed");
                let outcome = BotOutcome {
                    bot_id: bot.id,
                    action: BotAction::Fail,
                    reason: error.to_string(),
                };
                self.audit(&outcome, price);
                outcome
            }
        }
    }

    async fn evaluate_bot(&self, bot: &Bot) -> Result<BotOutcome, EngineError> {
        let now = self.clock.now();

        // One in-flight order per bot: the executor may still be working the
        // last intent
        if !self.ledger.in_flight_orders(&bot.id).is_empty() {
            let outcome = BotOutcome {
                bot_id: bot.id.clone(),
                action: BotAction::Skip,
                reason: "order in flight".to_string(),
            };
            self.audit(&outcome, None);
            return Ok(outcome);
        }

        let snapshot = self.market.get(&bot.config.symbol);
        let decision = self.strategy.evaluate(bot, snapshot.as_ref(), now);
        let price = snapshot.as_ref().map(|snapshot| snapshot.price);

        // Keep the trailing-stop watermark current for the next evaluation
        if let Some(snapshot) = &snapshot {
            self.ledger.mark_price_above_tp(&bot.id, snapshot.price, now)?;
        }

        let outcome = match decision {
            Decision::Hold { reason } => BotOutcome {
                bot_id: bot.id.clone(),
                action: BotAction::Hold,
                reason: reason.to_string(),
            },
            Decision::Enter { amount, reason } => match price {
                // Enter only ever fires off a fresh snapshot
                Some(price) => self.queue_entry(bot, amount, price, reason, now).await?,
                None => BotOutcome {
                    bot_id: bot.id.clone(),
                    action: BotAction::Skip,
                    reason: crate::strategy::reason::NO_MARKET_DATA.to_string(),
                },
            },
            Decision::Exit { fraction, reason } => {
                self.queue_exit(bot, fraction, reason, now).await?
            }
        };

        self.audit(&outcome, price);
        Ok(outcome)
    }

    /// Turn an Enter decision into a pending buy intent.
    async fn queue_entry(
        &self,
        bot: &Bot,
        amount: Decimal,
        price: Decimal,
        reason: &'static str,
        now: DateTime<Utc>,
    ) -> Result<BotOutcome, EngineError> {
        let exchange = self.factory.public();
        let pair = exchange.normalize_pair(&bot.config.symbol)?;
        let precision = exchange.asset_precision(&bot.config.symbol.base);
        let volume = truncate_to_precision(amount / price, precision);

        if volume <= Decimal::ZERO {
            return Ok(BotOutcome {
                bot_id: bot.id.clone(),
                action: BotAction::Skip,
                reason: "below minimum".to_string(),
            });
        }

        match self.ledger.append_buy_order(
            &bot.id,
            pair,
            OrderKind::Market,
            volume,
            None,
            self.max_attempts,
            now,
        ) {
            Ok(order) => {
                info!(bot = %bot.id, order = %order.id, %volume, "queued buy intent");
                Ok(BotOutcome {
                    bot_id: bot.id.clone(),
                    action: BotAction::Enter,
                    reason: reason.to_string(),
                })
            }
            Err(LedgerError::OrderConflict { .. }) | Err(LedgerError::InvalidTransition(_)) => {
                Ok(BotOutcome {
                    bot_id: bot.id.clone(),
                    action: BotAction::Skip,
                    reason: "another order raced in".to_string(),
                })
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Turn an Exit decision into the `active -> exiting` transition plus a
    /// pending sell intent, sized from the live balance.
    async fn queue_exit(
        &self,
        bot: &Bot,
        fraction: Decimal,
        reason: &'static str,
        now: DateTime<Utc>,
    ) -> Result<BotOutcome, EngineError> {
        let credentials = self.credentials.credentials(&bot.user_id).await?;
        let client = self.factory.client(&credentials)?;

        let pair = client.normalize_pair(&bot.config.symbol)?;
        let balances = client.fetch_balances().await?;
        let available = balances.get(&bot.config.symbol.base);

        let precision = client.asset_precision(&bot.config.symbol.base);
        let volume = truncate_to_precision(
            available * fraction * (Decimal::ONE - self.fee_buffer),
            precision,
        );

        if volume <= Decimal::ZERO || volume < client.min_order_size(&pair) {
            return Ok(BotOutcome {
                bot_id: bot.id.clone(),
                action: BotAction::Skip,
                reason: "below minimum".to_string(),
            });
        }

        match self.ledger.begin_exit(
            &bot.id,
            pair,
            OrderKind::Market,
            volume,
            None,
            self.max_attempts,
            now,
        ) {
            Ok(order) => {
                info!(bot = %bot.id, order = %order.id, %volume, "bot exiting, queued sell intent");
                Ok(BotOutcome {
                    bot_id: bot.id.clone(),
                    action: BotAction::Exit,
                    reason: reason.to_string(),
                })
            }
            Err(LedgerError::OrderConflict { .. }) | Err(LedgerError::InvalidTransition(_)) => {
                Ok(BotOutcome {
                    bot_id: bot.id.clone(),
                    action: BotAction::Skip,
                    reason: "another order raced in".to_string(),
                })
            }
            Err(error) => Err(error.into()),
        }
    }

    fn audit(&self, outcome: &BotOutcome, price: Option<Decimal>) {
        self.ledger.record_execution(BotExecution {
            bot_id: outcome.bot_id.clone(),
            time: self.clock.now(),
            action: outcome.action.into(),
            reason: outcome.reason.clone(),
            price,
        });
    }
}
