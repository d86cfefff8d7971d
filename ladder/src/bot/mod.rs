use chrono::{DateTime, Utc};
use ladder_execution::model::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use self::cycle::CycleSummary;

/// Closed-cycle summaries.
pub mod cycle;

/// Individual buys within a cycle.
pub mod entry;

/// Unique bot identifier.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct BotId(SmolStr);

impl BotId {
    pub fn generate() -> Self {
        Self(SmolStr::new(format!("bot_{}", Uuid::new_v4().simple())))
    }

    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self(SmolStr::new(id.as_ref()))
    }
}

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Authenticated owner identity, carried through call context - never parsed
/// out of request input.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct UserId(SmolStr);

impl UserId {
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self(SmolStr::new(id.as_ref()))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Cycle identifier, derived from the opening timestamp.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct CycleId(SmolStr);

impl CycleId {
    pub fn from_time(now: DateTime<Utc>) -> Self {
        Self(SmolStr::new(format!("cycle_{}", now.timestamp_millis())))
    }

    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self(SmolStr::new(id.as_ref()))
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Operational state machine of a bot.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    Active,
    Paused,
    Exiting,
    Completed,
    Stopped,
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BotStatus::Active => "active",
            BotStatus::Paused => "paused",
            BotStatus::Exiting => "exiting",
            BotStatus::Completed => "completed",
            BotStatus::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum BotConfigError {
    #[error("initial_order_amount must be positive")]
    NonPositiveOrderAmount,

    #[error("trade_multiplier must be >= 1")]
    TradeMultiplierBelowOne,

    #[error("re_entry_count must be >= 1")]
    ReEntryCountZero,

    #[error("step_percent must be positive")]
    NonPositiveStepPercent,

    #[error("step_multiplier must be >= 1")]
    StepMultiplierBelowOne,

    #[error("tp_target must be positive")]
    NonPositiveTpTarget,

    #[error("exit_percent must be in (0, 1]")]
    ExitPercentOutOfRange,

    #[error("re_entry_delay_minutes must not be negative")]
    NegativeReEntryDelay,
}

/// Immutable strategy parameters of one bot, editable only while paused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotConfig {
    pub symbol: Symbol,

    /// Quote-currency size of the first entry in a cycle.
    pub initial_order_amount: Decimal,

    /// Growth factor applied to each further entry's quote amount.
    pub trade_multiplier: Decimal,

    /// Maximum entries per cycle.
    pub re_entry_count: u32,

    /// Drop below the last entry price required for the first re-entry,
    /// percent.
    pub step_percent: Decimal,

    /// Growth factor applied to the step for each further re-entry.
    pub step_multiplier: Decimal,

    /// Take-profit above the average entry price, percent.
    pub tp_target: Decimal,

    /// Fraction of holdings sold on exit.
    pub exit_percent: Decimal,

    pub support_resistance_enabled: bool,

    pub trend_alignment_enabled: bool,

    /// Minimum wait between entries, minutes.
    pub re_entry_delay_minutes: i64,
}

impl BotConfig {
    pub fn validate(&self) -> Result<(), BotConfigError> {
        if self.initial_order_amount <= Decimal::ZERO {
            return Err(BotConfigError::NonPositiveOrderAmount);
        }
        if self.trade_multiplier < Decimal::ONE {
            return Err(BotConfigError::TradeMultiplierBelowOne);
        }
        if self.re_entry_count == 0 {
            return Err(BotConfigError::ReEntryCountZero);
        }
        if self.step_percent <= Decimal::ZERO {
            return Err(BotConfigError::NonPositiveStepPercent);
        }
        if self.step_multiplier < Decimal::ONE {
            return Err(BotConfigError::StepMultiplierBelowOne);
        }
        if self.tp_target <= Decimal::ZERO {
            return Err(BotConfigError::NonPositiveTpTarget);
        }
        if self.exit_percent <= Decimal::ZERO || self.exit_percent > Decimal::ONE {
            return Err(BotConfigError::ExitPercentOutOfRange);
        }
        if self.re_entry_delay_minutes < 0 {
            return Err(BotConfigError::NegativeReEntryDelay);
        }
        Ok(())
    }
}

/// One user's automated DCA strategy for one trading pair: immutable
/// [`BotConfig`] plus the mutable operational state the ledger maintains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bot {
    pub id: BotId,
    pub user_id: UserId,
    pub config: BotConfig,
    pub status: BotStatus,

    /// Filled entries in the current cycle.
    pub current_entry_count: u32,

    /// Quote currency spent across the current cycle's filled entries.
    pub total_invested: Decimal,

    /// Base units accumulated across the current cycle's filled entries.
    pub total_volume: Decimal,

    /// `total_invested / total_volume`, zero while the cycle is empty.
    pub average_entry_price: Decimal,

    pub cycle_id: CycleId,
    pub cycle_number: u32,
    pub cycle_start_time: DateTime<Utc>,
    pub previous_cycles: Vec<CycleSummary>,

    pub last_entry_time: Option<DateTime<Utc>>,
    pub last_entry_price: Option<Decimal>,
    pub last_exit_time: Option<DateTime<Utc>>,
    pub last_exit_price: Option<Decimal>,

    /// Highest price observed at-or-above the take-profit since it was first
    /// crossed this cycle; drives the trailing-stop exit.
    pub max_price_since_tp: Option<Decimal>,

    pub last_failed_exit_reason: Option<String>,
    pub last_failed_exit_time: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bot {
    pub fn new(id: BotId, user_id: UserId, config: BotConfig, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            config,
            status: BotStatus::Active,
            current_entry_count: 0,
            total_invested: Decimal::ZERO,
            total_volume: Decimal::ZERO,
            average_entry_price: Decimal::ZERO,
            cycle_id: CycleId::from_time(now),
            cycle_number: 1,
            cycle_start_time: now,
            previous_cycles: Vec::new(),
            last_entry_time: None,
            last_entry_price: None,
            last_exit_time: None,
            last_exit_price: None,
            max_price_since_tp: None,
            last_failed_exit_reason: None,
            last_failed_exit_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Take-profit price for the current cycle, `None` while it holds no
    /// inventory.
    pub fn tp_price(&self) -> Option<Decimal> {
        if self.average_entry_price > Decimal::ZERO {
            let hundred = Decimal::ONE_HUNDRED;
            Some(self.average_entry_price * (Decimal::ONE + self.config.tp_target / hundred))
        } else {
            None
        }
    }

    /// Fold one filled buy into the cycle aggregates.
    pub fn record_entry_fill(
        &mut self,
        order_amount: Decimal,
        price: Decimal,
        quantity: Decimal,
        now: DateTime<Utc>,
    ) {
        self.current_entry_count += 1;
        self.total_invested += order_amount;
        self.total_volume += quantity;
        self.recalculate_average();
        self.last_entry_time = Some(now);
        self.last_entry_price = Some(price);
        self.updated_at = now;
    }

    /// Close the current cycle with the exit sell's gross proceeds, returning
    /// the archived summary. Resets the cycle aggregates and re-activates.
    pub fn close_cycle(
        &mut self,
        recovered: Decimal,
        exit_price: Decimal,
        now: DateTime<Utc>,
    ) -> CycleSummary {
        let summary = CycleSummary {
            cycle_id: self.cycle_id.clone(),
            cycle_number: self.cycle_number,
            start_time: self.cycle_start_time,
            end_time: now,
            invested: self.total_invested,
            recovered,
            realized_pnl: recovered - self.total_invested,
        };
        self.previous_cycles.push(summary.clone());

        self.current_entry_count = 0;
        self.total_invested = Decimal::ZERO;
        self.total_volume = Decimal::ZERO;
        self.average_entry_price = Decimal::ZERO;
        self.cycle_number += 1;
        self.cycle_id = CycleId::from_time(now);
        self.cycle_start_time = now;
        self.status = BotStatus::Active;
        self.last_entry_time = None;
        self.last_entry_price = None;
        self.last_exit_time = Some(now);
        self.last_exit_price = Some(exit_price);
        self.max_price_since_tp = None;
        self.updated_at = now;

        summary
    }

    /// Fold a partial exit into the cycle aggregates without closing it.
    pub fn reduce_holdings(&mut self, sold_volume: Decimal, exit_price: Decimal, now: DateTime<Utc>) {
        let sold = sold_volume.min(self.total_volume);
        self.total_invested -= self.average_entry_price * sold;
        self.total_volume -= sold;
        if self.total_volume <= Decimal::ZERO {
            self.total_invested = Decimal::ZERO;
            self.total_volume = Decimal::ZERO;
        }
        self.recalculate_average();
        self.status = BotStatus::Active;
        self.last_exit_time = Some(now);
        self.last_exit_price = Some(exit_price);
        self.max_price_since_tp = None;
        self.updated_at = now;
    }

    /// Return an exiting bot to active after its sell failed permanently.
    pub fn mark_exit_failed<S: Into<String>>(&mut self, reason: S, now: DateTime<Utc>) {
        self.status = BotStatus::Active;
        self.last_failed_exit_reason = Some(reason.into());
        self.last_failed_exit_time = Some(now);
        self.updated_at = now;
    }

    fn recalculate_average(&mut self) {
        self.average_entry_price = if self.total_volume > Decimal::ZERO {
            self.total_invested / self.total_volume
        } else {
            Decimal::ZERO
        };
    }
}
