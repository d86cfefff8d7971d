#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! Dollar-cost-averaging bot control plane for a spot crypto exchange.
//!
//! Three loosely-coupled periodic workers coordinate exclusively through the
//! [`ledger::Ledger`]:
//!
//! - [`scheduler::BotScheduler`] sweeps active bots every few minutes,
//!   evaluates the pure [`strategy::StrategyEngine`] against the latest
//!   [`market::MarketView`] snapshot, and emits order *intents* (pending
//!   queue rows) - it never calls the exchange to trade.
//! - [`executor::OrderQueueExecutor`] claims due intents, submits them
//!   through the venue adapter, verifies execution, retries transient faults
//!   with backoff, and writes fills back into bot state.
//! - [`market::refresher::MarketDataRefresher`] keeps the shared market
//!   snapshot cache warm for every symbol an active bot watches.
//!
//! A bot accumulates inventory through laddered buy entries (each at a
//! growing price step below the last) and exits the whole cycle at a
//! take-profit above its average entry price; the closed cycle's realised
//! P&L is appended to the bot's history and a fresh cycle begins.

/// Bot aggregate, entries and cycle summaries.
pub mod bot;

/// Wall-clock injection seam.
pub mod clock;

/// Engine configuration.
pub mod config;

/// Per-user venue credential provisioning.
pub mod credentials;

/// Top-level error taxonomy for worker operations.
pub mod error;

/// Order queue executor worker and its backoff policy.
pub mod executor;

/// Transactional system of record for bots, entries, cycles and the order
/// queue.
pub mod ledger;

/// Market snapshot cache, indicator analysis, and the refresher worker.
pub mod market;

/// Pending order queue rows.
pub mod queue;

/// Bot scheduler worker.
pub mod scheduler;

/// Pure decision function turning bot + market state into enter/exit/hold.
pub mod strategy;

/// Worker assembly and lifecycle.
pub mod system;
