use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete engine configuration, injected at assembly.
///
/// Every field is defaulted so a deployment only overrides what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub executor: ExecutorConfig,
    pub refresher: RefresherConfig,
    pub strategy: StrategyConfig,

    /// Multiplicative reduction applied to sell volumes so venue fees can not
    /// exceed the available balance.
    #[serde(default = "defaults::fee_buffer")]
    pub fee_buffer: Decimal,

    /// Hard deadline on every venue request, seconds.
    #[serde(default = "defaults::exchange_request_timeout_secs")]
    pub exchange_request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            executor: ExecutorConfig::default(),
            refresher: RefresherConfig::default(),
            strategy: StrategyConfig::default(),
            fee_buffer: defaults::fee_buffer(),
            exchange_request_timeout_secs: defaults::exchange_request_timeout_secs(),
        }
    }
}

impl EngineConfig {
    pub fn exchange_request_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_request_timeout_secs)
    }
}

/// Bot scheduler worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between scheduler runs.
    pub period_secs: u64,

    /// Bots evaluated in parallel within one run.
    pub concurrency: usize,

    /// Wall-time bound on one run; once exceeded no further bots are
    /// dispatched.
    pub run_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period_secs: 300,
            concurrency: 8,
            run_timeout_secs: 240,
        }
    }
}

impl SchedulerConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn run_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.run_timeout_secs as i64)
    }
}

/// Order queue executor worker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Seconds between executor ticks.
    pub period_secs: u64,

    /// Orders claimed per tick.
    pub max_per_tick: usize,

    /// Orders stuck in `processing` longer than this are escalated back to
    /// `retry` by the housekeeping pass, seconds.
    pub stuck_timeout_secs: u64,

    /// Submission attempts before an order fails permanently.
    pub max_attempts: u32,

    /// Recorded errors after which a permanently failed sell abandons its
    /// exiting bot back to active.
    pub abandoned_error_threshold: usize,

    pub backoff: BackoffConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            period_secs: 60,
            max_per_tick: 20,
            stuck_timeout_secs: 600,
            max_attempts: 8,
            abandoned_error_threshold: 50,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ExecutorConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn stuck_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stuck_timeout_secs as i64)
    }
}

/// Exponential backoff shape for retryable order faults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_secs: u64,
    pub factor: f64,
    pub cap_secs: u64,

    /// Symmetric jitter fraction, eg/ 0.2 for plus or minus 20 percent.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_secs: 10,
            factor: 2.0,
            cap_secs: 600,
            jitter: 0.2,
        }
    }
}

/// Market data refresher worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefresherConfig {
    /// Seconds between refresh passes.
    pub period_secs: u64,

    /// Candle width requested for indicator analysis, minutes.
    pub ohlc_interval_minutes: u32,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            period_secs: 60,
            ohlc_interval_minutes: 60,
        }
    }
}

impl RefresherConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

/// Decision-function parameters shared by every bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Snapshots older than this are treated as missing, seconds.
    pub stale_threshold_secs: u64,

    /// Width of the trailing-stop band above the take-profit price, percent.
    pub retrace_epsilon_percent: Decimal,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            stale_threshold_secs: 180,
            retrace_epsilon_percent: defaults::retrace_epsilon_percent(),
        }
    }
}

impl StrategyConfig {
    pub fn stale_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_threshold_secs as i64)
    }
}

mod defaults {
    use rust_decimal::Decimal;

    pub fn fee_buffer() -> Decimal {
        Decimal::new(2, 3) // 0.002
    }

    pub fn retrace_epsilon_percent() -> Decimal {
        Decimal::new(25, 2) // 0.25
    }

    pub fn exchange_request_timeout_secs() -> u64 {
        15
    }
}
