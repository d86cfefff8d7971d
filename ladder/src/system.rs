use crate::{
    clock::Clock,
    config::EngineConfig,
    credentials::CredentialProvider,
    executor::OrderQueueExecutor,
    ledger::Ledger,
    market::{MarketView, analysis::AnalysisProvider, refresher::MarketDataRefresher},
    scheduler::BotScheduler,
};
use ladder_execution::client::{ExchangeClient, ExchangeClientFactory};
use std::sync::Arc;
use tokio::{sync::watch, task::JoinHandle};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Initialise a process-wide tracing subscriber honouring `RUST_LOG`,
/// defaulting to `info`. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// The three periodic workers running as supervised tasks in one process,
/// sharing the ledger and market view, coordinated only through ledger state.
#[derive(Debug)]
pub struct System {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl System {
    /// Assemble the workers from injected adapters and spawn them. Each
    /// worker receives its own dependencies - there are no process-global
    /// singletons to initialise.
    pub fn spawn<Factory>(
        config: EngineConfig,
        ledger: Arc<Ledger>,
        market: Arc<MarketView>,
        factory: Arc<Factory>,
        credentials: Arc<dyn CredentialProvider>,
        analysis: Arc<dyn AnalysisProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        Factory: ExchangeClientFactory + Send + Sync + 'static,
    {
        let (shutdown, shutdown_rx) = watch::channel(false);

        let scheduler = Arc::new(BotScheduler::new(
            Arc::clone(&ledger),
            Arc::clone(&market),
            Arc::clone(&factory),
            Arc::clone(&credentials),
            Arc::clone(&clock),
            &config,
        ));
        let executor = Arc::new(OrderQueueExecutor::new(
            Arc::clone(&ledger),
            Arc::clone(&factory),
            credentials,
            Arc::clone(&clock),
            &config,
        ));
        let refresher = Arc::new(MarketDataRefresher::new(
            ledger,
            market,
            factory.public() as Arc<dyn ExchangeClient>,
            analysis,
            config.refresher.clone(),
            clock,
        ));

        let handles = vec![
            tokio::spawn({
                let scheduler = Arc::clone(&scheduler);
                let shutdown = shutdown_rx.clone();
                async move { scheduler.run(shutdown).await }
            }),
            tokio::spawn({
                let executor = Arc::clone(&executor);
                let shutdown = shutdown_rx.clone();
                async move { executor.run(shutdown).await }
            }),
            tokio::spawn({
                let refresher = Arc::clone(&refresher);
                let shutdown = shutdown_rx;
                async move { refresher.run(shutdown).await }
            }),
        ];

        info!("system started: scheduler, executor, refresher");
        Self { shutdown, handles }
    }

    /// Signal shutdown and wait for the workers to drain. Pending retries
    /// persist in the ledger and are picked up on the next start.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("system stopped");
    }
}
