use crate::{
    client::{ApiCredentials, ExchangeClient, ExchangeClientFactory},
    error::ExecutionError,
    model::{
        Asset, ExchangePair, Symbol, TxId,
        balance::Balances,
        market::{Candle, Ticker},
        order::{OrderAck, OrderReport, OrderRequest},
    },
};
use async_trait::async_trait;
use chrono::Utc;
use fnv::FnvHashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::{collections::VecDeque, sync::Arc};

use super::kraken::pairs;

/// Scriptable in-process [`ExchangeClient`] used by integration tests.
///
/// Market metadata (pair table, precision, minimum sizes) is shared with the
/// live Kraken client so tests exercise the real lookup paths. Everything
/// else is scripted: push expected responses, then assert on the recorded
/// submissions.
#[derive(Debug, Default)]
pub struct MockExchange {
    tickers: Mutex<FnvHashMap<ExchangePair, Ticker>>,
    candles: Mutex<FnvHashMap<ExchangePair, Vec<Candle>>>,
    balances: Mutex<Balances>,
    place_responses: Mutex<VecDeque<Result<OrderAck, ExecutionError>>>,
    query_responses: Mutex<FnvHashMap<TxId, VecDeque<Result<OrderReport, ExecutionError>>>>,

    /// Every [`OrderRequest`] submitted, in submission order.
    placed: Mutex<Vec<OrderRequest>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ticker(&self, pair: ExchangePair, ticker: Ticker) {
        self.tickers.lock().insert(pair, ticker);
    }

    pub fn set_candles(&self, pair: ExchangePair, candles: Vec<Candle>) {
        self.candles.lock().insert(pair, candles);
    }

    pub fn set_balance(&self, asset: Asset, quantity: Decimal) {
        self.balances.lock().insert(asset, quantity);
    }

    /// Queue the outcome of the next `place_order` call.
    pub fn push_place_response(&self, response: Result<OrderAck, ExecutionError>) {
        self.place_responses.lock().push_back(response);
    }

    /// Convenience: queue an acceptance with the provided txid.
    pub fn push_place_ok(&self, txid: &str) {
        self.push_place_response(Ok(OrderAck::new(TxId::new(txid), Utc::now())));
    }

    /// Queue the outcome of the next `query_order` call for `txid`.
    pub fn push_query_response(&self, txid: &str, response: Result<OrderReport, ExecutionError>) {
        self.query_responses
            .lock()
            .entry(TxId::new(txid))
            .or_default()
            .push_back(response);
    }

    /// Orders submitted so far, in submission order.
    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        self.placed.lock().clone()
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    fn venue(&self) -> &'static str {
        "mock"
    }

    fn normalize_pair(&self, symbol: &Symbol) -> Result<ExchangePair, ExecutionError> {
        pairs::exchange_pair(symbol).ok_or_else(|| ExecutionError::UnknownPair(symbol.to_string()))
    }

    fn asset_precision(&self, asset: &Asset) -> u32 {
        pairs::volume_decimals(asset)
    }

    fn min_order_size(&self, pair: &ExchangePair) -> Decimal {
        pairs::min_order_size(pair)
    }

    async fn fetch_ticker(&self, pair: &ExchangePair) -> Result<Ticker, ExecutionError> {
        self.tickers
            .lock()
            .get(pair)
            .cloned()
            .ok_or_else(|| ExecutionError::Transient(format!("mock: no ticker for {pair}")))
    }

    async fn fetch_ohlc(
        &self,
        pair: &ExchangePair,
        _interval_minutes: u32,
    ) -> Result<Vec<Candle>, ExecutionError> {
        Ok(self.candles.lock().get(pair).cloned().unwrap_or_default())
    }

    async fn fetch_balances(&self) -> Result<Balances, ExecutionError> {
        Ok(self.balances.lock().clone())
    }

    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck, ExecutionError> {
        self.placed.lock().push(request);
        self.place_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ExecutionError::Other("mock: unscripted place_order".to_string())))
    }

    async fn query_order(&self, txid: &TxId) -> Result<OrderReport, ExecutionError> {
        self.query_responses
            .lock()
            .get_mut(txid)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(ExecutionError::OrderNotFound(txid.to_string())))
    }
}

/// [`ExchangeClientFactory`] handing the same [`MockExchange`] to every user.
#[derive(Debug, Clone)]
pub struct MockExchangeFactory {
    client: Arc<MockExchange>,
}

impl MockExchangeFactory {
    pub fn new(client: Arc<MockExchange>) -> Self {
        Self { client }
    }

    pub fn exchange(&self) -> Arc<MockExchange> {
        Arc::clone(&self.client)
    }
}

impl ExchangeClientFactory for MockExchangeFactory {
    type Client = MockExchange;

    fn client(&self, _credentials: &ApiCredentials) -> Result<Arc<Self::Client>, ExecutionError> {
        Ok(Arc::clone(&self.client))
    }

    fn public(&self) -> Arc<Self::Client> {
        Arc::clone(&self.client)
    }
}
