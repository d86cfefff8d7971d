//! Assemble the full control plane against the scriptable mock venue, create
//! one bot, and let the workers run briefly.
//!
//! ```sh
//! cargo run --example dca_system
//! ```

use ladder::{
    bot::{Bot, BotConfig, BotId, UserId},
    clock::SystemClock,
    config::EngineConfig,
    credentials::StaticCredentials,
    ledger::Ledger,
    market::{MarketView, analysis::IndicatorAnalysis},
    system::{System, init_tracing},
};
use ladder_execution::{
    client::{ApiCredentials, mock::{MockExchange, MockExchangeFactory}},
    model::{ExchangePair, market::Ticker},
};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    init_tracing();

    let exchange = Arc::new(MockExchange::new());
    exchange.set_ticker(
        ExchangePair::new("XXBTZUSD"),
        Ticker {
            last: dec!(50000),
            bid: dec!(49995),
            ask: dec!(50005),
            time: chrono::Utc::now(),
        },
    );

    let ledger = Arc::new(Ledger::new());
    let user = UserId::new("demo-user");
    let bot = Bot::new(
        BotId::generate(),
        user.clone(),
        BotConfig {
            symbol: "BTC/USD".parse().expect("valid symbol"),
            initial_order_amount: dec!(10),
            trade_multiplier: dec!(2),
            re_entry_count: 8,
            step_percent: dec!(1),
            step_multiplier: dec!(2),
            tp_target: dec!(3),
            exit_percent: dec!(1),
            support_resistance_enabled: false,
            trend_alignment_enabled: false,
            re_entry_delay_minutes: 0,
        },
        chrono::Utc::now(),
    );
    ledger.insert_bot(bot).expect("valid bot config");

    let credentials = StaticCredentials::new().with_user(
        user,
        ApiCredentials {
            key: "demo-key".to_string(),
            secret: "demo-secret".to_string(),
        },
    );

    let system = System::spawn(
        EngineConfig::default(),
        ledger,
        Arc::new(MarketView::new()),
        Arc::new(MockExchangeFactory::new(exchange)),
        Arc::new(credentials),
        Arc::new(IndicatorAnalysis::default()),
        Arc::new(SystemClock),
    );

    tokio::time::sleep(Duration::from_secs(5)).await;
    system.shutdown().await;
}
