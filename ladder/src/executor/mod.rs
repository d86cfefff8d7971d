use crate::{
    clock::Clock,
    config::{EngineConfig, ExecutorConfig},
    credentials::CredentialProvider,
    ledger::{Ledger, SellOutcome},
    queue::{PendingOrder, QueueStatus},
};
use ladder_execution::{
    client::{ExchangeClient, ExchangeClientFactory},
    model::{
        Side, TxId,
        order::{ExchangeOrderStatus, OrderReport, OrderRequest, truncate_to_precision},
    },
};
use rust_decimal::Decimal;
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use self::backoff::BackoffPolicy;

/// Exponential backoff policy for retryable order faults.
pub mod backoff;

/// Poll spacing while confirming a submitted order reached a terminal state.
const VERIFY_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Verification polls per pass before the verdict is left to the watchdog.
const VERIFY_ATTEMPTS: u32 = 3;

/// Error-history marker for a zero-fill cancellation seen at verification;
/// its presence means the one free retry is spent.
const VERIFY_CANCEL_NOTE: &str = "canceled at verification with zero fill";

/// Outcome counters of one executor tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub claimed: usize,
    pub resumed: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
    pub left_processing: usize,
    pub recovered_stuck: usize,
    pub recovered_abandoned: usize,
}

enum OrderOutcome {
    Completed,
    Retried,
    Failed,
    LeftProcessing,
}

/// Periodic worker draining the pending-order queue: claim due intents,
/// submit them through the venue adapter, verify execution, and write fills
/// back into bot state. Transient faults retry with capped exponential
/// backoff; permanent faults fail the order and un-wedge its bot.
#[derive(Debug)]
pub struct OrderQueueExecutor<Factory: ExchangeClientFactory> {
    ledger: Arc<Ledger>,
    factory: Arc<Factory>,
    credentials: Arc<dyn CredentialProvider>,
    clock: Arc<dyn Clock>,
    config: ExecutorConfig,
    backoff: BackoffPolicy,
}

enum PreflightVerdict {
    Retry(String),
    Fail(String),
}

impl<Factory> OrderQueueExecutor<Factory>
where
    Factory: ExchangeClientFactory,
{
    pub fn new(
        ledger: Arc<Ledger>,
        factory: Arc<Factory>,
        credentials: Arc<dyn CredentialProvider>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            ledger,
            factory,
            credentials,
            clock,
            config: config.executor.clone(),
            backoff: BackoffPolicy::new(&config.executor.backoff),
        }
    }

    /// Run the periodic queue-draining loop until shutdown is signalled.
    /// Backoff waits live in the ledger rows, so shutdown never loses work.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.period());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => { self.tick().await; }
                _ = shutdown.changed() => {
                    info!("order queue executor shutting down");
                    break;
                }
            }
        }
    }

    /// One bounded tick: resume unverified submissions, claim due intents,
    /// then housekeeping.
    pub async fn tick(&self) -> TickSummary {
        let mut summary = TickSummary::default();

        // Submissions from an earlier pass whose verdict is still unknown,
        // including the crashed-before-write-back case: re-query the txid and
        // apply the fill idempotently
        for order in self.ledger.processing_orders_with_txid() {
            summary.resumed += 1;
            let outcome = self.resume_order(&order).await;
            tally(&mut summary, outcome);
        }

        while summary.claimed < self.config.max_per_tick {
            let Some(order) = self.ledger.claim_next_due(self.clock.now()) else {
                break;
            };
            summary.claimed += 1;
            let outcome = self.execute_order(&order).await;
            tally(&mut summary, outcome);
        }

        let now = self.clock.now();
        summary.recovered_stuck = self
            .ledger
            .recover_stuck_orders(self.config.stuck_timeout(), now)
            .len();
        summary.recovered_abandoned = self
            .ledger
            .recover_abandoned_exits(self.config.abandoned_error_threshold, now)
            .len();

        debug!(
            claimed = summary.claimed,
            resumed = summary.resumed,
            completed = summary.completed,
            retried = summary.retried,
            failed = summary.failed,
            "executor tick"
        );
        summary
    }

    async fn resume_order(&self, order: &PendingOrder) -> OrderOutcome {
        let Some(txid) = order.txid.clone() else {
            return OrderOutcome::LeftProcessing;
        };
        let client = match self.client_for(order).await {
            Ok(client) => client,
            Err(outcome) => return outcome,
        };
        self.verify(client.as_ref(), order, &txid).await
    }

    async fn execute_order(&self, order: &PendingOrder) -> OrderOutcome {
        if self.ledger.bot(&order.bot_id).is_err() {
            return self.fail(order, "owning bot no longer exists");
        }

        let client = match self.client_for(order).await {
            Ok(client) => client,
            Err(outcome) => return outcome,
        };

        // A claimed order that already carries a txid was submitted before:
        // never re-place, only verify
        if let Some(txid) = order.txid.clone() {
            return self.verify(client.as_ref(), order, &txid).await;
        }

        let mut volume = order.volume;
        if order.side == Side::Sell {
            match self.preflight_sell(client.as_ref(), order).await {
                Ok(adjusted) => volume = adjusted,
                Err(PreflightVerdict::Retry(message)) => return self.retry(order, &message, None),
                Err(PreflightVerdict::Fail(message)) => return self.fail(order, &message),
            }
        }

        let request = OrderRequest::new(
            order.pair.clone(),
            order.side,
            order.kind,
            volume,
            order.price,
        );

        match client.place_order(request).await {
            Ok(ack) => {
                info!(order = %order.id, txid = %ack.txid, side = %order.side, "order accepted by venue");
                if let Err(error) = self.ledger.set_order_txid(&order.id, &ack.txid, self.clock.now())
                {
                    warn!(order = %order.id, %error, "failed to persist txid");
                }
                self.verify(client.as_ref(), order, &ack.txid).await
            }
            Err(error) if error.is_retryable() => {
                self.retry(order, &error.to_string(), error.retry_after())
            }
            Err(error) => self.fail(order, &error.to_string()),
        }
    }

    async fn client_for(
        &self,
        order: &PendingOrder,
    ) -> Result<Arc<Factory::Client>, OrderOutcome> {
        let credentials = match self.credentials.credentials(&order.user_id).await {
            Ok(credentials) => credentials,
            Err(error) if error.is_retryable() => {
                return Err(self.retry(order, &error.to_string(), None));
            }
            Err(error) => return Err(self.fail(order, &error.to_string())),
        };
        self.factory
            .client(&credentials)
            .map_err(|error| self.fail(order, &error.to_string()))
    }

    /// Sell pre-flight: re-check pair mapping, live balance, precision and
    /// venue minimum against the queue row before any submission.
    async fn preflight_sell(
        &self,
        client: &Factory::Client,
        order: &PendingOrder,
    ) -> Result<Decimal, PreflightVerdict> {
        let pair = client
            .normalize_pair(&order.symbol)
            .map_err(|error| PreflightVerdict::Fail(error.to_string()))?;
        if pair != order.pair {
            return Err(PreflightVerdict::Fail(format!(
                "pair mapping changed: row has {}, venue maps {}",
                order.pair, pair
            )));
        }

        let balances = client.fetch_balances().await.map_err(|error| {
            if error.is_retryable() {
                PreflightVerdict::Retry(error.to_string())
            } else {
                PreflightVerdict::Fail(error.to_string())
            }
        })?;

        let available = balances.get(&order.symbol.base);
        if available < order.volume {
            return Err(PreflightVerdict::Fail(format!(
                "insufficient balance: {} {} available, {} requested",
                available, order.symbol.base, order.volume
            )));
        }

        let volume =
            truncate_to_precision(order.volume, client.asset_precision(&order.symbol.base));
        if volume <= Decimal::ZERO || volume < client.min_order_size(&pair) {
            return Err(PreflightVerdict::Fail(
                "volume below venue minimum after precision adjustment".to_string(),
            ));
        }
        Ok(volume)
    }

    /// Confirm a submitted order reached a terminal state, polling up to
    /// [`VERIFY_ATTEMPTS`] times. An unknown verdict leaves the row in
    /// `processing` for the resume pass and, eventually, the watchdog.
    async fn verify(
        &self,
        client: &Factory::Client,
        order: &PendingOrder,
        txid: &TxId,
    ) -> OrderOutcome {
        for _ in 0..VERIFY_ATTEMPTS {
            tokio::time::sleep(VERIFY_POLL_INTERVAL).await;

            let report = match client.query_order(txid).await {
                Ok(report) => report,
                Err(error) => {
                    warn!(order = %order.id, %txid, %error, "order verification query failed");
                    continue;
                }
            };

            if report.status.is_terminal() && report.executed_volume > Decimal::ZERO {
                return self.record_fill(order, txid, &report);
            }

            match report.status {
                ExchangeOrderStatus::Open => {}
                ExchangeOrderStatus::Canceled | ExchangeOrderStatus::Expired => {
                    // Zero-fill cancellation: one free retry, then permanent
                    let already_retried = self
                        .ledger
                        .order(&order.id)
                        .map(|row| {
                            row.errors
                                .iter()
                                .any(|error| error.message.contains(VERIFY_CANCEL_NOTE))
                        })
                        .unwrap_or(false);
                    return if already_retried {
                        self.fail(order, "canceled again at verification")
                    } else {
                        self.retry(order, VERIFY_CANCEL_NOTE, None)
                    };
                }
                ExchangeOrderStatus::Closed => {
                    return self.fail(order, "closed with zero executed volume");
                }
            }
        }

        warn!(order = %order.id, %txid, "verification inconclusive, leaving order in processing");
        OrderOutcome::LeftProcessing
    }

    fn record_fill(&self, order: &PendingOrder, txid: &TxId, report: &OrderReport) -> OrderOutcome {
        let now = self.clock.now();
        let result = match order.side {
            Side::Buy => self
                .ledger
                .record_buy_fill(
                    &order.id,
                    txid,
                    report.executed_volume,
                    report.cost,
                    report.fee,
                    now,
                )
                .map(|entry| {
                    info!(order = %order.id, entry = entry.entry_number, "buy fill recorded");
                }),
            Side::Sell => self
                .ledger
                .record_sell_fill(
                    &order.id,
                    txid,
                    report.executed_volume,
                    report.cost,
                    report.fee,
                    now,
                )
                .map(|outcome| {
                    if let SellOutcome::CycleClosed(summary) = outcome {
                        info!(
                            order = %order.id,
                            cycle = summary.cycle_number,
                            realized_pnl = %summary.realized_pnl,
                            "exit fill recorded, cycle closed"
                        );
                    }
                }),
        };

        match result {
            Ok(()) => OrderOutcome::Completed,
            Err(error) => {
                // The venue-side fill is real; leave the row for an
                // idempotent re-apply on the next resume pass
                warn!(order = %order.id, %error, "fill write-back failed");
                OrderOutcome::LeftProcessing
            }
        }
    }

    fn retry(&self, order: &PendingOrder, error: &str, retry_after: Option<Duration>) -> OrderOutcome {
        let delay = self.backoff.next_delay(order.attempts, retry_after);
        match self
            .ledger
            .mark_order_retry(&order.id, error, delay, self.clock.now())
        {
            Ok(QueueStatus::Failed) => OrderOutcome::Failed,
            Ok(_) => {
                debug!(order = %order.id, ?delay, error, "order scheduled for retry");
                OrderOutcome::Retried
            }
            Err(ledger_error) => {
                warn!(order = %order.id, %ledger_error, "failed to mark order for retry");
                OrderOutcome::LeftProcessing
            }
        }
    }

    fn fail(&self, order: &PendingOrder, error: &str) -> OrderOutcome {
        match self
            .ledger
            .mark_order_failed(&order.id, error, self.clock.now())
        {
            Ok(()) => OrderOutcome::Failed,
            Err(ledger_error) => {
                warn!(order = %order.id, %ledger_error, "failed to mark order as failed");
                OrderOutcome::LeftProcessing
            }
        }
    }
}

fn tally(summary: &mut TickSummary, outcome: OrderOutcome) {
    match outcome {
        OrderOutcome::Completed => summary.completed += 1,
        OrderOutcome::Retried => summary.retried += 1,
        OrderOutcome::Failed => summary.failed += 1,
        OrderOutcome::LeftProcessing => summary.left_processing += 1,
    }
}
