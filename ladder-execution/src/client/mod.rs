use crate::{
    error::ExecutionError,
    model::{
        Asset, ExchangePair, Symbol, TxId,
        balance::Balances,
        market::{Candle, Ticker},
        order::{OrderAck, OrderReport, OrderRequest},
    },
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Live Kraken spot client.
pub mod kraken;

/// Scriptable in-process client for tests.
pub mod mock;

/// Per-user API credentials loaded from a secret store.
///
/// `secret` is the venue's base64-encoded signing secret, exactly as issued.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCredentials {
    pub key: String,
    pub secret: String,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secrets never reach logs
        f.debug_struct("ApiCredentials")
            .field("key", &"<redacted>")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Capability set the trading system requires from a spot exchange.
///
/// This is the only surface through which the scheduler, executor and
/// refresher reach a venue. Implementations normalise symbols, apply volume
/// precision, and collapse venue faults into [`ExecutionError`].
#[async_trait]
pub trait ExchangeClient: Send + Sync + std::fmt::Debug {
    /// Venue identifier for logs and audit rows.
    fn venue(&self) -> &'static str;

    /// Translate a display symbol into the venue-native pair, failing fast on
    /// symbols outside the supported mapping table.
    fn normalize_pair(&self, symbol: &Symbol) -> Result<ExchangePair, ExecutionError>;

    /// Decimal places the venue accepts for volumes of this asset.
    fn asset_precision(&self, asset: &Asset) -> u32;

    /// Smallest order volume the venue accepts for this pair, in base units.
    fn min_order_size(&self, pair: &ExchangePair) -> Decimal;

    async fn fetch_ticker(&self, pair: &ExchangePair) -> Result<Ticker, ExecutionError>;

    async fn fetch_ohlc(
        &self,
        pair: &ExchangePair,
        interval_minutes: u32,
    ) -> Result<Vec<Candle>, ExecutionError>;

    /// Free balances, merged with any WebSocket-fed cache snapshot: where the
    /// REST read reports zero for an asset the cache holds, the cache wins.
    async fn fetch_balances(&self) -> Result<Balances, ExecutionError>;

    /// Submit an order. Buys carry the fee-in-base flag, sells fee-in-quote;
    /// sells are additionally clamped by `1 - fee_buffer` and re-truncated to
    /// asset precision before transmission.
    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck, ExecutionError>;

    /// Query the state of a previously accepted order.
    async fn query_order(&self, txid: &TxId) -> Result<OrderReport, ExecutionError>;
}

/// Builds per-user [`ExchangeClient`] instances over a shared connection pool.
pub trait ExchangeClientFactory: Send + Sync {
    type Client: ExchangeClient + 'static;

    /// Authenticated client bound to one user's credentials.
    fn client(&self, credentials: &ApiCredentials) -> Result<Arc<Self::Client>, ExecutionError>;

    /// Unauthenticated client for public market data.
    fn public(&self) -> Arc<Self::Client>;
}
