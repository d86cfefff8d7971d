use crate::{
    bot::{
        Bot, BotConfig, BotConfigError, BotId, BotStatus,
        cycle::CycleSummary,
        entry::{Entry, EntryId, EntrySource, EntryStatus},
    },
    queue::{OrderId, PendingOrder, QueueStatus},
    scheduler::RunSummary,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use fnv::FnvHashMap;
use itertools::Itertools;
use ladder_execution::model::{ExchangePair, OrderKind, Side, Symbol, TxId};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("bot not found: {0}")]
    BotNotFound(String),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("conflicting in-flight {side} order for bot {bot}")]
    OrderConflict { bot: String, side: Side },

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("invalid bot config: {0}")]
    InvalidConfig(#[from] BotConfigError),
}

/// What a scheduler evaluation did with one bot; persisted for operator
/// review.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionAction {
    Enter,
    Exit,
    Hold,
    Skip,
    Fail,
}

/// Audit row written for every scheduler decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotExecution {
    pub bot_id: BotId,
    pub time: DateTime<Utc>,
    pub action: ExecutionAction,
    pub reason: String,
    pub price: Option<Decimal>,
}

/// Outcome of recording a sell fill.
#[derive(Debug, Clone, PartialEq)]
pub enum SellOutcome {
    /// Full exit: the cycle closed and its summary was archived.
    CycleClosed(CycleSummary),

    /// Partial exit: inventory reduced, cycle stays open.
    PartialExit { remaining_volume: Decimal },

    /// The fill had already been applied under this txid.
    AlreadyRecorded,
}

#[derive(Debug, Default)]
struct LedgerState {
    bots: FnvHashMap<BotId, Bot>,
    entries: FnvHashMap<BotId, Vec<Entry>>,
    orders: FnvHashMap<OrderId, PendingOrder>,
    executions: Vec<BotExecution>,
    runs: Vec<RunSummary>,
}

/// System of record for bots, entries, cycles and the pending-order queue.
///
/// Every mutator is a transaction: checks and writes happen under one lock,
/// so the conditional-update semantics ("no conflicting in-flight order",
/// "claim flips pending to processing exactly once") hold even with the three
/// workers running concurrently. Fill recording is idempotent with respect to
/// `(order, txid)` - the executor may crash between venue submission and
/// write-back and simply re-apply.
///
/// The in-process store stands in for the deployment's document database; the
/// backend choice is an external collaborator.
#[derive(Debug, Default)]
pub struct Ledger {
    state: Mutex<LedgerState>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Bots ────────────────────────────────────────────────────────────

    pub fn insert_bot(&self, bot: Bot) -> Result<(), LedgerError> {
        bot.config.validate()?;
        let mut state = self.state.lock();
        if state.bots.contains_key(&bot.id) {
            return Err(LedgerError::InvalidTransition(format!(
                "bot {} already exists",
                bot.id
            )));
        }
        state.entries.entry(bot.id.clone()).or_default();
        state.bots.insert(bot.id.clone(), bot);
        Ok(())
    }

    pub fn bot(&self, id: &BotId) -> Result<Bot, LedgerError> {
        self.state
            .lock()
            .bots
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::BotNotFound(id.to_string()))
    }

    pub fn bots_with_status(&self, status: BotStatus) -> Vec<Bot> {
        self.state
            .lock()
            .bots
            .values()
            .filter(|bot| bot.status == status)
            .cloned()
            .collect()
    }

    /// Distinct symbols across all active bots, for the refresher.
    pub fn active_symbols(&self) -> Vec<Symbol> {
        self.state
            .lock()
            .bots
            .values()
            .filter(|bot| bot.status == BotStatus::Active)
            .map(|bot| bot.config.symbol.clone())
            .unique()
            .collect()
    }

    pub fn pause_bot(&self, id: &BotId, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.transition_bot(id, BotStatus::Active, BotStatus::Paused, now)
    }

    pub fn resume_bot(&self, id: &BotId, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.transition_bot(id, BotStatus::Paused, BotStatus::Active, now)
    }

    pub fn stop_bot(&self, id: &BotId, now: DateTime<Utc>) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        let bot = get_bot_mut(&mut state, id)?;
        match bot.status {
            BotStatus::Active | BotStatus::Paused => {
                bot.status = BotStatus::Stopped;
                bot.updated_at = now;
                Ok(())
            }
            other => Err(LedgerError::InvalidTransition(format!(
                "cannot stop bot {id} in status {other}"
            ))),
        }
    }

    /// Replace a bot's configuration. Legal only while paused, so a running
    /// scheduler evaluation can never race a config edit.
    pub fn update_config(
        &self,
        id: &BotId,
        config: BotConfig,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        config.validate()?;
        let mut state = self.state.lock();
        let bot = get_bot_mut(&mut state, id)?;
        if bot.status != BotStatus::Paused {
            return Err(LedgerError::InvalidTransition(format!(
                "config of bot {id} is only editable while paused, status is {}",
                bot.status
            )));
        }
        bot.config = config;
        bot.updated_at = now;
        Ok(())
    }

    fn transition_bot(
        &self,
        id: &BotId,
        from: BotStatus,
        to: BotStatus,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        let bot = get_bot_mut(&mut state, id)?;
        if bot.status != from {
            return Err(LedgerError::InvalidTransition(format!(
                "bot {id} is {}, expected {from}",
                bot.status
            )));
        }
        bot.status = to;
        bot.updated_at = now;
        Ok(())
    }

    /// Track the running high above the take-profit price, feeding the
    /// trailing-stop exit rule.
    pub fn mark_price_above_tp(
        &self,
        id: &BotId,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        let bot = get_bot_mut(&mut state, id)?;
        if bot.status != BotStatus::Active {
            return Ok(());
        }
        let Some(tp_price) = bot.tp_price() else {
            return Ok(());
        };
        if price >= tp_price {
            let max = bot.max_price_since_tp.map_or(price, |max| max.max(price));
            bot.max_price_since_tp = Some(max);
            bot.updated_at = now;
        }
        Ok(())
    }

    // ── Entries ─────────────────────────────────────────────────────────

    pub fn entries(&self, bot: &BotId) -> Vec<Entry> {
        self.state
            .lock()
            .entries
            .get(bot)
            .cloned()
            .unwrap_or_default()
    }

    /// Filled bot-execution entries of the bot's current cycle, in entry
    /// order.
    pub fn current_cycle_entries(&self, bot_id: &BotId) -> Vec<Entry> {
        let state = self.state.lock();
        let Some(bot) = state.bots.get(bot_id) else {
            return Vec::new();
        };
        state
            .entries
            .get(bot_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| {
                        entry.cycle_id == bot.cycle_id
                            && entry.status == EntryStatus::Filled
                            && entry.source == EntrySource::BotExecution
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    // ── Order queue ─────────────────────────────────────────────────────

    pub fn order(&self, id: &OrderId) -> Result<PendingOrder, LedgerError> {
        self.state
            .lock()
            .orders
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::OrderNotFound(id.to_string()))
    }

    /// Orders that count against the one-per-side invariant.
    pub fn in_flight_orders(&self, bot: &BotId) -> Vec<PendingOrder> {
        self.state
            .lock()
            .orders
            .values()
            .filter(|order| order.bot_id == *bot && order.status.is_in_flight())
            .cloned()
            .collect()
    }

    /// Queue a buy intent. Fails on any other in-flight buy for the bot.
    #[allow(clippy::too_many_arguments)]
    pub fn append_buy_order(
        &self,
        bot_id: &BotId,
        pair: ExchangePair,
        kind: OrderKind,
        volume: Decimal,
        price: Option<Decimal>,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<PendingOrder, LedgerError> {
        let mut state = self.state.lock();
        let bot = state
            .bots
            .get(bot_id)
            .ok_or_else(|| LedgerError::BotNotFound(bot_id.to_string()))?;
        if bot.status != BotStatus::Active {
            return Err(LedgerError::InvalidTransition(format!(
                "cannot queue a buy for bot {bot_id} in status {}",
                bot.status
            )));
        }
        if has_in_flight(&state, bot_id, Side::Buy) {
            return Err(LedgerError::OrderConflict {
                bot: bot_id.to_string(),
                side: Side::Buy,
            });
        }

        let order = PendingOrder::new(bot, pair, Side::Buy, kind, volume, price, max_attempts, now);
        state.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    /// Transition an active bot to `exiting` and queue its sell intent, as
    /// one transaction. Fails on any other in-flight sell.
    #[allow(clippy::too_many_arguments)]
    pub fn begin_exit(
        &self,
        bot_id: &BotId,
        pair: ExchangePair,
        kind: OrderKind,
        volume: Decimal,
        price: Option<Decimal>,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<PendingOrder, LedgerError> {
        let mut state = self.state.lock();
        if has_in_flight(&state, bot_id, Side::Sell) {
            return Err(LedgerError::OrderConflict {
                bot: bot_id.to_string(),
                side: Side::Sell,
            });
        }
        let bot = get_bot_mut(&mut state, bot_id)?;
        if bot.status != BotStatus::Active {
            return Err(LedgerError::InvalidTransition(format!(
                "cannot begin exit for bot {bot_id} in status {}",
                bot.status
            )));
        }
        bot.status = BotStatus::Exiting;
        bot.updated_at = now;

        let order = PendingOrder::new(bot, pair, Side::Sell, kind, volume, price, max_attempts, now);
        state.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    /// Claim the next due `pending`/`retry` order, flipping it to
    /// `processing`. The flip happens under the store lock, so two executors
    /// can never claim the same row.
    pub fn claim_next_due(&self, now: DateTime<Utc>) -> Option<PendingOrder> {
        let mut state = self.state.lock();
        let id = state
            .orders
            .values()
            .filter(|order| {
                matches!(order.status, QueueStatus::Pending | QueueStatus::Retry)
                    && order.next_retry_at <= now
            })
            .min_by_key(|order| (order.next_retry_at, order.created_at, order.id.clone()))
            .map(|order| order.id.clone())?;

        let order = state.orders.get_mut(&id)?;
        order.status = QueueStatus::Processing;
        order.updated_at = now;
        Some(order.clone())
    }

    /// Orders mid-verification from a previous pass: submitted (txid known)
    /// but with no terminal verdict recorded yet.
    pub fn processing_orders_with_txid(&self) -> Vec<PendingOrder> {
        self.state
            .lock()
            .orders
            .values()
            .filter(|order| order.status == QueueStatus::Processing && order.txid.is_some())
            .cloned()
            .collect()
    }

    /// Attach the venue txid after acceptance. Idempotent.
    pub fn set_order_txid(
        &self,
        id: &OrderId,
        txid: &TxId,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        let order = get_order_mut(&mut state, id)?;
        if let Some(existing) = &order.txid {
            if existing != txid {
                return Err(LedgerError::InvalidTransition(format!(
                    "order {id} already has txid {existing}"
                )));
            }
            return Ok(());
        }
        order.txid = Some(txid.clone());
        order.updated_at = now;
        Ok(())
    }

    /// Record a verified buy fill: writes the entry and folds the bot's cycle
    /// aggregates, in one transaction. Re-applying with the same txid is a
    /// no-op returning the already-written entry.
    #[allow(clippy::too_many_arguments)]
    pub fn record_buy_fill(
        &self,
        order_id: &OrderId,
        txid: &TxId,
        executed_volume: Decimal,
        executed_cost: Decimal,
        fee: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Entry, LedgerError> {
        if executed_volume <= Decimal::ZERO {
            return Err(LedgerError::InvalidTransition(
                "cannot record a zero-volume fill".to_string(),
            ));
        }

        let mut state = self.state.lock();

        let (bot_id, already_completed, txid_matches) = {
            let order = get_order_mut(&mut state, order_id)?;
            if order.side != Side::Buy {
                return Err(LedgerError::InvalidTransition(format!(
                    "order {order_id} is not a buy"
                )));
            }
            (
                order.bot_id.clone(),
                order.status == QueueStatus::Completed,
                order.txid.as_ref() == Some(txid),
            )
        };

        if already_completed {
            if !txid_matches {
                return Err(LedgerError::InvalidTransition(format!(
                    "order {order_id} already completed under a different txid"
                )));
            }
            // Idempotent re-apply: hand back the entry already written
            return state
                .entries
                .values()
                .flatten()
                .find(|entry| entry.order_id == *order_id)
                .cloned()
                .ok_or_else(|| {
                    LedgerError::InvalidTransition(format!(
                        "completed order {order_id} has no entry"
                    ))
                });
        }

        if !state.bots.contains_key(&bot_id) {
            return Err(LedgerError::BotNotFound(bot_id.to_string()));
        }

        {
            let order = get_order_mut(&mut state, order_id)?;
            order.status = QueueStatus::Completed;
            order.txid = Some(txid.clone());
            order.updated_at = now;
        }

        let bot = state
            .bots
            .get_mut(&bot_id)
            .ok_or_else(|| LedgerError::BotNotFound(bot_id.to_string()))?;

        let price = executed_cost / executed_volume;
        bot.record_entry_fill(executed_cost, price, executed_volume, now);

        let entry = Entry {
            id: EntryId::generate(),
            bot_id: bot_id.clone(),
            cycle_id: bot.cycle_id.clone(),
            cycle_number: bot.cycle_number,
            entry_number: bot.current_entry_count,
            order_amount: executed_cost,
            price,
            quantity: executed_volume,
            fee,
            timestamp: now,
            order_id: order_id.clone(),
            txid: Some(txid.clone()),
            status: EntryStatus::Filled,
            source: EntrySource::BotExecution,
        };
        state
            .entries
            .entry(bot_id.clone())
            .or_default()
            .push(entry.clone());

        info!(
            bot = %bot_id,
            entry = entry.entry_number,
            price = %entry.price,
            quantity = %entry.quantity,
            "recorded buy fill"
        );
        Ok(entry)
    }

    /// Record a verified sell fill. A full exit closes the cycle and archives
    /// its summary; a partial exit reduces inventory and re-activates the
    /// bot. Re-applying with the same txid is a no-op.
    #[allow(clippy::too_many_arguments)]
    pub fn record_sell_fill(
        &self,
        order_id: &OrderId,
        txid: &TxId,
        executed_volume: Decimal,
        gross_proceeds: Decimal,
        _fee: Decimal,
        now: DateTime<Utc>,
    ) -> Result<SellOutcome, LedgerError> {
        if executed_volume <= Decimal::ZERO {
            return Err(LedgerError::InvalidTransition(
                "cannot record a zero-volume fill".to_string(),
            ));
        }

        let mut state = self.state.lock();

        let (bot_id, already_completed, txid_matches) = {
            let order = get_order_mut(&mut state, order_id)?;
            if order.side != Side::Sell {
                return Err(LedgerError::InvalidTransition(format!(
                    "order {order_id} is not a sell"
                )));
            }
            (
                order.bot_id.clone(),
                order.status == QueueStatus::Completed,
                order.txid.as_ref() == Some(txid),
            )
        };

        if already_completed {
            if !txid_matches {
                return Err(LedgerError::InvalidTransition(format!(
                    "order {order_id} already completed under a different txid"
                )));
            }
            return Ok(SellOutcome::AlreadyRecorded);
        }

        if !state.bots.contains_key(&bot_id) {
            return Err(LedgerError::BotNotFound(bot_id.to_string()));
        }

        {
            let order = get_order_mut(&mut state, order_id)?;
            order.status = QueueStatus::Completed;
            order.txid = Some(txid.clone());
            order.updated_at = now;
        }

        let bot = state
            .bots
            .get_mut(&bot_id)
            .ok_or_else(|| LedgerError::BotNotFound(bot_id.to_string()))?;

        let exit_price = gross_proceeds / executed_volume;
        let full_exit =
            bot.config.exit_percent >= Decimal::ONE || executed_volume >= bot.total_volume;

        if full_exit {
            let summary = bot.close_cycle(gross_proceeds, exit_price, now);
            info!(
                bot = %bot_id,
                cycle = summary.cycle_number,
                realized_pnl = %summary.realized_pnl,
                "cycle closed"
            );
            Ok(SellOutcome::CycleClosed(summary))
        } else {
            bot.reduce_holdings(executed_volume, exit_price, now);
            Ok(SellOutcome::PartialExit {
                remaining_volume: bot.total_volume,
            })
        }
    }

    /// Push an order back for another attempt after a retryable fault; at
    /// `max_attempts` the order fails permanently instead.
    pub fn mark_order_retry(
        &self,
        order_id: &OrderId,
        error: &str,
        delay: Duration,
        now: DateTime<Utc>,
    ) -> Result<QueueStatus, LedgerError> {
        let mut state = self.state.lock();
        let order = get_order_mut(&mut state, order_id)?;
        if !order.status.is_in_flight() {
            return Err(LedgerError::InvalidTransition(format!(
                "order {order_id} is terminal ({})",
                order.status
            )));
        }

        order.attempts += 1;
        if order.attempts >= order.max_attempts {
            let reason = format!("max attempts reached: {error}");
            fail_order(&mut state, order_id, &reason, now)?;
            return Ok(QueueStatus::Failed);
        }

        order.record_error(error, now);
        order.status = QueueStatus::Retry;
        order.next_retry_at = now
            + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(600));
        Ok(QueueStatus::Retry)
    }

    /// Fail an order permanently; a sell abandoning an exiting bot reverts it
    /// to active with the failure recorded.
    pub fn mark_order_failed(
        &self,
        order_id: &OrderId,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        fail_order(&mut state, order_id, error, now)
    }

    /// Watchdog: orders stuck in `processing` past the timeout are flipped
    /// back to due `retry`. Their txid (if any) survives, so the next claim
    /// resumes verification instead of re-submitting.
    pub fn recover_stuck_orders(
        &self,
        stuck_timeout: ChronoDuration,
        now: DateTime<Utc>,
    ) -> Vec<OrderId> {
        let mut state = self.state.lock();
        let stuck: Vec<OrderId> = state
            .orders
            .values()
            .filter(|order| {
                order.status == QueueStatus::Processing && now - order.updated_at >= stuck_timeout
            })
            .map(|order| order.id.clone())
            .collect();

        for id in &stuck {
            if let Some(order) = state.orders.get_mut(id) {
                order.record_error("stuck in processing beyond watchdog timeout", now);
                order.status = QueueStatus::Retry;
                order.next_retry_at = now;
                warn!(order = %id, "watchdog escalated stuck order to retry");
            }
        }
        stuck
    }

    /// Recovery: a permanently failed sell with a deep error history must not
    /// pin its bot in `exiting` forever.
    pub fn recover_abandoned_exits(
        &self,
        error_threshold: usize,
        now: DateTime<Utc>,
    ) -> Vec<BotId> {
        const ABANDON_REASON: &str = "abandoned, infinite retry";

        let mut state = self.state.lock();
        let candidates: Vec<(OrderId, BotId)> = state
            .orders
            .values()
            .filter(|order| {
                order.side == Side::Sell
                    && order.status == QueueStatus::Failed
                    && order.errors.len() > error_threshold
            })
            .map(|order| (order.id.clone(), order.bot_id.clone()))
            .collect();

        let mut recovered = Vec::new();
        for (order_id, bot_id) in candidates {
            let Some(bot) = state.bots.get_mut(&bot_id) else {
                continue;
            };
            if bot.status != BotStatus::Exiting {
                continue;
            }
            bot.mark_exit_failed(ABANDON_REASON, now);
            if let Some(order) = state.orders.get_mut(&order_id) {
                order.record_error(ABANDON_REASON, now);
            }
            warn!(bot = %bot_id, order = %order_id, "recovered bot from abandoned exit");
            recovered.push(bot_id);
        }
        recovered
    }

    // ── Audit ───────────────────────────────────────────────────────────

    pub fn record_execution(&self, execution: BotExecution) {
        self.state.lock().executions.push(execution);
    }

    pub fn executions(&self, bot: &BotId) -> Vec<BotExecution> {
        self.state
            .lock()
            .executions
            .iter()
            .filter(|execution| execution.bot_id == *bot)
            .cloned()
            .collect()
    }

    pub fn record_run(&self, run: RunSummary) {
        self.state.lock().runs.push(run);
    }

    pub fn runs(&self) -> Vec<RunSummary> {
        self.state.lock().runs.clone()
    }
}

fn get_bot_mut<'a>(state: &'a mut LedgerState, id: &BotId) -> Result<&'a mut Bot, LedgerError> {
    state
        .bots
        .get_mut(id)
        .ok_or_else(|| LedgerError::BotNotFound(id.to_string()))
}

fn get_order_mut<'a>(
    state: &'a mut LedgerState,
    id: &OrderId,
) -> Result<&'a mut PendingOrder, LedgerError> {
    state
        .orders
        .get_mut(id)
        .ok_or_else(|| LedgerError::OrderNotFound(id.to_string()))
}

fn has_in_flight(state: &LedgerState, bot: &BotId, side: Side) -> bool {
    state
        .orders
        .values()
        .any(|order| order.bot_id == *bot && order.side == side && order.status.is_in_flight())
}

fn fail_order(
    state: &mut LedgerState,
    order_id: &OrderId,
    error: &str,
    now: DateTime<Utc>,
) -> Result<(), LedgerError> {
    let order = get_order_mut(state, order_id)?;
    order.record_error(error, now);
    order.status = QueueStatus::Failed;
    let side = order.side;
    let bot_id = order.bot_id.clone();

    if side == Side::Sell {
        if let Some(bot) = state.bots.get_mut(&bot_id) {
            if bot.status == BotStatus::Exiting {
                bot.mark_exit_failed(error, now);
                warn!(bot = %bot_id, order = %order_id, error, "exit failed, bot reverted to active");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::UserId;
    use rust_decimal_macros::dec;

    fn bot_config() -> BotConfig {
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

    fn ledger_with_bot() -> (Ledger, BotId, DateTime<Utc>) {
        let now = Utc::now();
        let ledger = Ledger::new();
        let bot = Bot::new(BotId::generate(), UserId::new("u1"), bot_config(), now);
        let id = bot.id.clone();
        ledger.insert_bot(bot).unwrap();
        (ledger, id, now)
    }

    fn queue_buy(ledger: &Ledger, bot: &BotId, now: DateTime<Utc>) -> PendingOrder {
        ledger
            .append_buy_order(
                bot,
                ExchangePair::new("XXBTZUSD"),
                OrderKind::Market,
                dec!(0.0002),
                None,
                8,
                now,
            )
            .unwrap()
    }

    #[test]
    fn test_append_buy_order_rejects_second_in_flight_buy() {
        let (ledger, bot, now) = ledger_with_bot();
        queue_buy(&ledger, &bot, now);

        let conflict = ledger.append_buy_order(
            &bot,
            ExchangePair::new("XXBTZUSD"),
            OrderKind::Market,
            dec!(0.0002),
            None,
            8,
            now,
        );
        assert!(matches!(
            conflict,
            Err(LedgerError::OrderConflict {
                side: Side::Buy,
                ..
            })
        ));
    }

    #[test]
    fn test_begin_exit_transitions_bot_and_queues_exactly_one_sell() {
        let (ledger, bot_id, now) = ledger_with_bot();
        let buy = queue_buy(&ledger, &bot_id, now);
        ledger
            .record_buy_fill(&buy.id, &TxId::new("T1"), dec!(0.0002), dec!(10), dec!(0.016), now)
            .unwrap();

        ledger
            .begin_exit(
                &bot_id,
                ExchangePair::new("XXBTZUSD"),
                OrderKind::Market,
                dec!(0.0002),
                None,
                8,
                now,
            )
            .unwrap();

        // P5: exiting <=> exactly one in-flight sell
        let bot = ledger.bot(&bot_id).unwrap();
        assert_eq!(bot.status, BotStatus::Exiting);
        let sells: Vec<_> = ledger
            .in_flight_orders(&bot_id)
            .into_iter()
            .filter(|order| order.side == Side::Sell)
            .collect();
        assert_eq!(sells.len(), 1);

        // A second exit attempt loses the conditional update
        let conflict = ledger.begin_exit(
            &bot_id,
            ExchangePair::new("XXBTZUSD"),
            OrderKind::Market,
            dec!(0.0002),
            None,
            8,
            now,
        );
        assert!(matches!(conflict, Err(LedgerError::OrderConflict { .. })));
    }

    #[test]
    fn test_claim_next_due_is_exclusive_and_ordered() {
        let (ledger, bot_id, now) = ledger_with_bot();
        let order = queue_buy(&ledger, &bot_id, now);

        let claimed = ledger.claim_next_due(now).unwrap();
        assert_eq!(claimed.id, order.id);
        assert_eq!(claimed.status, QueueStatus::Processing);

        // Same row cannot be claimed twice
        assert!(ledger.claim_next_due(now).is_none());
    }

    #[test]
    fn test_claim_skips_orders_not_yet_due() {
        let (ledger, bot_id, now) = ledger_with_bot();
        let order = queue_buy(&ledger, &bot_id, now);
        ledger.claim_next_due(now).unwrap();
        ledger
            .mark_order_retry(&order.id, "rate limited", Duration::from_secs(30), now)
            .unwrap();

        assert!(ledger.claim_next_due(now).is_none());
        assert!(
            ledger
                .claim_next_due(now + ChronoDuration::seconds(31))
                .is_some()
        );
    }

    #[test]
    fn test_record_buy_fill_maintains_bot_invariants() {
        let (ledger, bot_id, now) = ledger_with_bot();
        let order = queue_buy(&ledger, &bot_id, now);

        let entry = ledger
            .record_buy_fill(&order.id, &TxId::new("T1"), dec!(0.0002), dec!(10), dec!(0.016), now)
            .unwrap();
        assert_eq!(entry.entry_number, 1);

        let bot = ledger.bot(&bot_id).unwrap();
        let entries = ledger.current_cycle_entries(&bot_id);

        // P1: entry count equals filled entries in the current cycle
        assert_eq!(bot.current_entry_count as usize, entries.len());
        // P2: aggregates equal sums over filled entries
        assert_eq!(
            bot.total_invested,
            entries.iter().map(|entry| entry.order_amount).sum::<Decimal>()
        );
        assert_eq!(
            bot.total_volume,
            entries.iter().map(|entry| entry.quantity).sum::<Decimal>()
        );
        // P3: avg x volume == invested up to rounding tolerance
        let drift = (bot.average_entry_price * bot.total_volume - bot.total_invested).abs();
        assert!(drift < dec!(0.000000001));
    }

    #[test]
    fn test_record_buy_fill_is_idempotent() {
        let (ledger, bot_id, now) = ledger_with_bot();
        let order = queue_buy(&ledger, &bot_id, now);
        let txid = TxId::new("T1");

        let first = ledger
            .record_buy_fill(&order.id, &txid, dec!(0.0002), dec!(10), dec!(0.016), now)
            .unwrap();
        let again = ledger
            .record_buy_fill(&order.id, &txid, dec!(0.0002), dec!(10), dec!(0.016), now)
            .unwrap();

        // P7: identical effect, nothing double-counted
        assert_eq!(first, again);
        let bot = ledger.bot(&bot_id).unwrap();
        assert_eq!(bot.current_entry_count, 1);
        assert_eq!(bot.total_invested, dec!(10));
        assert_eq!(ledger.current_cycle_entries(&bot_id).len(), 1);
    }

    #[test]
    fn test_record_buy_fill_rejects_foreign_txid_rewrite() {
        let (ledger, bot_id, now) = ledger_with_bot();
        let order = queue_buy(&ledger, &bot_id, now);
        ledger
            .record_buy_fill(&order.id, &TxId::new("T1"), dec!(0.0002), dec!(10), dec!(0.016), now)
            .unwrap();

        let rewrite = ledger.record_buy_fill(
            &order.id,
            &TxId::new("T2"),
            dec!(0.0002),
            dec!(10),
            dec!(0.016),
            now,
        );
        assert!(matches!(rewrite, Err(LedgerError::InvalidTransition(_))));
    }

    #[test]
    fn test_entry_numbers_are_dense_within_a_cycle() {
        let (ledger, bot_id, now) = ledger_with_bot();

        for n in 1..=3u32 {
            let order = queue_buy(&ledger, &bot_id, now);
            ledger
                .record_buy_fill(
                    &order.id,
                    &TxId::new(format!("T{n}")),
                    dec!(0.0002),
                    dec!(10),
                    dec!(0.016),
                    now,
                )
                .unwrap();
        }

        // P6: dense 1..N
        let numbers: Vec<u32> = ledger
            .current_cycle_entries(&bot_id)
            .iter()
            .map(|entry| entry.entry_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_full_exit_closes_cycle_with_realized_pnl() {
        let (ledger, bot_id, now) = ledger_with_bot();
        let buy = queue_buy(&ledger, &bot_id, now);
        ledger
            .record_buy_fill(&buy.id, &TxId::new("T1"), dec!(0.0002), dec!(10), dec!(0.016), now)
            .unwrap();

        let sell = ledger
            .begin_exit(
                &bot_id,
                ExchangePair::new("XXBTZUSD"),
                OrderKind::Market,
                dec!(0.0002),
                None,
                8,
                now,
            )
            .unwrap();

        let outcome = ledger
            .record_sell_fill(&sell.id, &TxId::new("T2"), dec!(0.0002), dec!(10.30), dec!(0.02), now)
            .unwrap();

        // L1: realized P&L is proceeds minus pre-close invested
        match outcome {
            SellOutcome::CycleClosed(summary) => {
                assert_eq!(summary.realized_pnl, dec!(0.30));
                assert_eq!(summary.invested, dec!(10));
                assert_eq!(summary.recovered, dec!(10.30));
            }
            other => panic!("expected CycleClosed, got {other:?}"),
        }

        let bot = ledger.bot(&bot_id).unwrap();
        assert_eq!(bot.status, BotStatus::Active);
        assert_eq!(bot.cycle_number, 2);
        assert_eq!(bot.current_entry_count, 0);
        assert_eq!(bot.previous_cycles.len(), 1);

        // Idempotent re-apply
        assert_eq!(
            ledger
                .record_sell_fill(&sell.id, &TxId::new("T2"), dec!(0.0002), dec!(10.30), dec!(0.02), now)
                .unwrap(),
            SellOutcome::AlreadyRecorded
        );
    }

    #[test]
    fn test_failed_sell_reverts_exiting_bot() {
        let (ledger, bot_id, now) = ledger_with_bot();
        let buy = queue_buy(&ledger, &bot_id, now);
        ledger
            .record_buy_fill(&buy.id, &TxId::new("T1"), dec!(0.0002), dec!(10), dec!(0.016), now)
            .unwrap();
        let sell = ledger
            .begin_exit(
                &bot_id,
                ExchangePair::new("XXBTZUSD"),
                OrderKind::Market,
                dec!(0.0002),
                None,
                8,
                now,
            )
            .unwrap();

        ledger
            .mark_order_failed(&sell.id, "invalid order precision: volume", now)
            .unwrap();

        let bot = ledger.bot(&bot_id).unwrap();
        assert_eq!(bot.status, BotStatus::Active);
        assert_eq!(
            bot.last_failed_exit_reason.as_deref(),
            Some("invalid order precision: volume")
        );
        assert!(bot.last_failed_exit_time.is_some());

        let order = ledger.order(&sell.id).unwrap();
        assert_eq!(order.status, QueueStatus::Failed);
        assert!(!order.errors.is_empty());
    }

    #[test]
    fn test_retry_escalates_to_failed_at_max_attempts() {
        let (ledger, bot_id, now) = ledger_with_bot();
        let order = queue_buy(&ledger, &bot_id, now);

        for attempt in 1..8u32 {
            let status = ledger
                .mark_order_retry(&order.id, "rate limited", Duration::from_secs(10), now)
                .unwrap();
            assert_eq!(status, QueueStatus::Retry, "attempt {attempt}");
        }

        // Eighth attempt hits max_attempts = 8
        let status = ledger
            .mark_order_retry(&order.id, "rate limited", Duration::from_secs(10), now)
            .unwrap();
        assert_eq!(status, QueueStatus::Failed);

        let stored = ledger.order(&order.id).unwrap();
        assert_eq!(stored.attempts, 8);
        assert_eq!(stored.status, QueueStatus::Failed);
    }

    #[test]
    fn test_watchdog_escalates_stuck_processing_orders() {
        let (ledger, bot_id, now) = ledger_with_bot();
        queue_buy(&ledger, &bot_id, now);
        let claimed = ledger.claim_next_due(now).unwrap();

        let later = now + ChronoDuration::minutes(11);
        let stuck = ledger.recover_stuck_orders(ChronoDuration::minutes(10), later);
        assert_eq!(stuck, vec![claimed.id.clone()]);

        let order = ledger.order(&claimed.id).unwrap();
        assert_eq!(order.status, QueueStatus::Retry);
        assert_eq!(order.next_retry_at, later);
    }

    #[test]
    fn test_abandoned_exit_recovery() {
        let (ledger, bot_id, now) = ledger_with_bot();
        let buy = queue_buy(&ledger, &bot_id, now);
        ledger
            .record_buy_fill(&buy.id, &TxId::new("T1"), dec!(0.0002), dec!(10), dec!(0.016), now)
            .unwrap();
        let sell = ledger
            .begin_exit(
                &bot_id,
                ExchangePair::new("XXBTZUSD"),
                OrderKind::Market,
                dec!(0.0002),
                None,
                8,
                now,
            )
            .unwrap();

        // Simulate a deep error history then a permanent failure that somehow
        // left the bot exiting
        {
            let mut state = ledger.state.lock();
            let order = state.orders.get_mut(&sell.id).unwrap();
            for n in 0..60 {
                order.record_error(format!("fault {n}"), now);
            }
            order.status = QueueStatus::Failed;
        }

        let recovered = ledger.recover_abandoned_exits(50, now);
        assert_eq!(recovered, vec![bot_id.clone()]);

        let bot = ledger.bot(&bot_id).unwrap();
        assert_eq!(bot.status, BotStatus::Active);
        assert_eq!(
            bot.last_failed_exit_reason.as_deref(),
            Some("abandoned, infinite retry")
        );
    }

    #[test]
    fn test_mark_price_above_tp_tracks_running_high() {
        let (ledger, bot_id, now) = ledger_with_bot();
        let buy = queue_buy(&ledger, &bot_id, now);
        ledger
            .record_buy_fill(&buy.id, &TxId::new("T1"), dec!(0.0002), dec!(10), dec!(0.016), now)
            .unwrap();
        // avg = 50000, tp = 51500

        ledger.mark_price_above_tp(&bot_id, dec!(51000), now).unwrap();
        assert_eq!(ledger.bot(&bot_id).unwrap().max_price_since_tp, None);

        ledger.mark_price_above_tp(&bot_id, dec!(51600), now).unwrap();
        ledger.mark_price_above_tp(&bot_id, dec!(52100), now).unwrap();
        ledger.mark_price_above_tp(&bot_id, dec!(51700), now).unwrap();
        assert_eq!(
            ledger.bot(&bot_id).unwrap().max_price_since_tp,
            Some(dec!(52100))
        );
    }

    #[test]
    fn test_update_config_requires_paused() {
        let (ledger, bot_id, now) = ledger_with_bot();

        let denied = ledger.update_config(&bot_id, bot_config(), now);
        assert!(matches!(denied, Err(LedgerError::InvalidTransition(_))));

        ledger.pause_bot(&bot_id, now).unwrap();
        ledger.update_config(&bot_id, bot_config(), now).unwrap();
        ledger.resume_bot(&bot_id, now).unwrap();
        assert_eq!(ledger.bot(&bot_id).unwrap().status, BotStatus::Active);
    }
}
