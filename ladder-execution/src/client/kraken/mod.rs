use crate::{
    client::{ApiCredentials, ExchangeClient, ExchangeClientFactory},
    error::ExecutionError,
    model::{
        Asset, ExchangePair, Side, Symbol, TxId,
        balance::{BalanceCache, Balances},
        market::{Candle, Ticker},
        order::{OrderAck, OrderReport, OrderRequest, truncate_to_precision},
    },
};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use ladder_integration::protocol::http::{PublicNoHeaders, rest::client::RestClient};
use rust_decimal::Decimal;
use sha2::Sha512;
use std::{sync::Arc, time::Duration};
use tracing::debug;

use self::http::{
    KrakenParser,
    requests::{
        add_order::{AddOrderBody, AddOrderRequest, OFLAG_FEE_IN_BASE, OFLAG_FEE_IN_QUOTE},
        balance::{BalanceBody, GetBalanceRequest},
        ohlc::{GetOhlcRequest, OhlcParams},
        query_orders::{QueryOrdersBody, QueryOrdersRequest},
        ticker::{GetTickerRequest, TickerParams},
    },
    signer::{KrakenRequestSigner, KrakenSigner, Nonce},
};

/// Kraken REST envelope, parser and endpoint requests.
pub mod http;

/// Static venue metadata: pair mapping, asset codes, precision, minimums.
pub mod pairs;

pub const KRAKEN_BASE_URL: &str = "https://api.kraken.com";

/// Default multiplicative reduction applied to sell volumes so venue fees can
/// not push the order past the available balance.
pub const DEFAULT_FEE_BUFFER: &str = "0.002";

/// Construction parameters shared by every [`KrakenClient`] a process builds.
#[derive(Debug, Clone)]
pub struct KrakenConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub fee_buffer: Decimal,
}

impl Default for KrakenConfig {
    fn default() -> Self {
        Self {
            base_url: KRAKEN_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(15),
            fee_buffer: DEFAULT_FEE_BUFFER
                .parse()
                .expect("default fee buffer is a decimal"),
        }
    }
}

/// Live Kraken spot client.
///
/// Public market-data endpoints work without credentials; private endpoints
/// require [`ApiCredentials`] and are signed per the venue scheme (see
/// [`http::signer::KrakenSigner`]).
#[derive(Debug)]
pub struct KrakenClient {
    public: RestClient<'static, PublicNoHeaders, KrakenParser>,
    private: Option<RestClient<'static, KrakenRequestSigner, KrakenParser>>,
    nonce: Nonce,
    balance_cache: Option<Arc<BalanceCache>>,
    fee_buffer: Decimal,
}

impl KrakenClient {
    /// Unauthenticated client for public market data.
    pub fn public_only(config: &KrakenConfig, http_client: reqwest::Client) -> Self {
        Self {
            public: RestClient::new(config.base_url.clone(), PublicNoHeaders, KrakenParser)
                .with_request_timeout(config.request_timeout)
                .with_http_client(http_client),
            private: None,
            nonce: Nonce::new(),
            balance_cache: None,
            fee_buffer: config.fee_buffer,
        }
    }

    /// Authenticated client bound to one user's credentials.
    pub fn new(
        config: &KrakenConfig,
        credentials: &ApiCredentials,
        http_client: reqwest::Client,
        balance_cache: Option<Arc<BalanceCache>>,
    ) -> Result<Self, ExecutionError> {
        let secret = base64::engine::general_purpose::STANDARD
            .decode(&credentials.secret)
            .map_err(|_| ExecutionError::AuthFailed("API secret is not valid base64".to_string()))?;

        let mac = Hmac::<Sha512>::new_from_slice(&secret)
            .map_err(|_| ExecutionError::AuthFailed("API secret has invalid length".to_string()))?;

        let signer = KrakenRequestSigner::new(KrakenSigner::new(credentials.key.clone()), mac);

        let private = RestClient::new(config.base_url.clone(), signer, KrakenParser)
            .with_request_timeout(config.request_timeout)
            .with_http_client(http_client.clone());

        let mut client = Self::public_only(config, http_client);
        client.private = Some(private);
        client.balance_cache = balance_cache;
        Ok(client)
    }

    fn private(
        &self,
    ) -> Result<&RestClient<'static, KrakenRequestSigner, KrakenParser>, ExecutionError> {
        self.private
            .as_ref()
            .ok_or_else(|| ExecutionError::AuthFailed("no credentials configured".to_string()))
    }
}

#[async_trait]
impl ExchangeClient for KrakenClient {
    fn venue(&self) -> &'static str {
        "kraken"
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
        let request = GetTickerRequest::new(TickerParams::new(pair.to_string()));
        let response = self.public.execute(request).await?;
        let result = response.into_result()?;

        // Kraken keys the result by primary pair name, older markets by altname
        let payload = result
            .0
            .get(pair.as_str())
            .or_else(|| result.0.values().next())
            .ok_or_else(|| ExecutionError::Other(format!("ticker response missing {pair}")))?;

        let price_at = |values: &[Decimal], leg: &str| {
            values.first().copied().ok_or_else(|| {
                ExecutionError::Other(format!("ticker {leg} quote missing for {pair}"))
            })
        };

        Ok(Ticker {
            last: price_at(&payload.last, "last")?,
            bid: price_at(&payload.bid, "bid")?,
            ask: price_at(&payload.ask, "ask")?,
            time: Utc::now(),
        })
    }

    async fn fetch_ohlc(
        &self,
        pair: &ExchangePair,
        interval_minutes: u32,
    ) -> Result<Vec<Candle>, ExecutionError> {
        let request = GetOhlcRequest::new(OhlcParams::new(pair.to_string(), interval_minutes));
        let response = self.public.execute(request).await?;
        let result = response.into_result()?;

        let rows = result
            .candles
            .get(pair.as_str())
            .or_else(|| result.candles.values().next())
            .ok_or_else(|| ExecutionError::Other(format!("OHLC response missing {pair}")))?;

        Ok(rows
            .iter()
            .map(|row| Candle {
                time: DateTime::from_timestamp(row.0, 0).unwrap_or_default(),
                open: row.1,
                high: row.2,
                low: row.3,
                close: row.4,
                vwap: row.5,
                volume: row.6,
            })
            .collect())
    }

    async fn fetch_balances(&self) -> Result<Balances, ExecutionError> {
        let request = GetBalanceRequest::new(BalanceBody::new(self.nonce.next()));
        let response = self.private()?.execute(request).await?;
        let result = response.into_result()?;

        let rest: Balances = result
            .0
            .into_iter()
            .map(|(code, quantity)| (pairs::normalize_asset(&code), quantity))
            .collect();

        Ok(match &self.balance_cache {
            Some(cache) => {
                let cached = cache.snapshot();
                let merged = rest.merged_with_cached(&cached);
                debug!(venue = self.venue(), "merged REST balances with cache snapshot");
                merged
            }
            None => rest,
        })
    }

    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck, ExecutionError> {
        let OrderRequest {
            pair,
            side,
            kind,
            mut volume,
            price,
        } = request;

        let oflags = match side {
            Side::Buy => OFLAG_FEE_IN_BASE,
            Side::Sell => OFLAG_FEE_IN_QUOTE,
        };

        // Fees on sells settle in quote but margin for error is taken in base:
        // shave the fee buffer and re-truncate so the venue never sees a
        // volume the account cannot cover
        if side == Side::Sell {
            let decimals = pairs::base_asset(&pair)
                .map(|base| pairs::volume_decimals(&base))
                .unwrap_or(8);
            volume = truncate_to_precision(volume * (Decimal::ONE - self.fee_buffer), decimals);
            if volume <= Decimal::ZERO {
                return Err(ExecutionError::MinOrderSize(format!(
                    "sell volume truncates to zero for {pair}"
                )));
            }
        }

        let body = AddOrderBody::new(self.nonce.next(), pair.to_string(), side, kind, volume, price, oflags);
        let response = self.private()?.execute(AddOrderRequest::new(body)).await?;
        let result = response.into_result()?;

        let txid = result
            .txid
            .first()
            .map(|txid| TxId::new(txid))
            .ok_or_else(|| ExecutionError::Other("order accepted without txid".to_string()))?;

        Ok(OrderAck::new(txid, Utc::now()))
    }

    async fn query_order(&self, txid: &TxId) -> Result<OrderReport, ExecutionError> {
        let body = QueryOrdersBody::new(self.nonce.next(), txid.to_string());
        let response = self.private()?.execute(QueryOrdersRequest::new(body)).await?;
        let result = response.into_result()?;

        let info = result
            .0
            .get(txid.as_str())
            .ok_or_else(|| ExecutionError::OrderNotFound(txid.to_string()))?;

        Ok(OrderReport::new(
            info.status.into(),
            info.executed_volume,
            info.cost,
            info.fee,
        ))
    }
}

/// Builds per-user [`KrakenClient`]s over one shared connection pool and one
/// shared [`BalanceCache`].
#[derive(Debug)]
pub struct KrakenClientFactory {
    config: KrakenConfig,
    http_client: reqwest::Client,
    balance_cache: Arc<BalanceCache>,
    public: Arc<KrakenClient>,
}

impl KrakenClientFactory {
    pub fn new(config: KrakenConfig) -> Self {
        let http_client = reqwest::Client::new();
        let public = Arc::new(KrakenClient::public_only(&config, http_client.clone()));
        Self {
            config,
            http_client,
            balance_cache: Arc::new(BalanceCache::new()),
            public,
        }
    }

    /// Cache handle for an external WebSocket feed to keep warm.
    pub fn balance_cache(&self) -> Arc<BalanceCache> {
        Arc::clone(&self.balance_cache)
    }
}

impl ExchangeClientFactory for KrakenClientFactory {
    type Client = KrakenClient;

    fn client(&self, credentials: &ApiCredentials) -> Result<Arc<Self::Client>, ExecutionError> {
        KrakenClient::new(
            &self.config,
            credentials,
            self.http_client.clone(),
            Some(Arc::clone(&self.balance_cache)),
        )
        .map(Arc::new)
    }

    fn public(&self) -> Arc<Self::Client> {
        Arc::clone(&self.public)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_fee_buffer() {
        let config = KrakenConfig::default();
        assert_eq!(config.fee_buffer, dec!(0.002));
        assert_eq!(config.base_url, KRAKEN_BASE_URL);
    }

    #[test]
    fn test_client_without_credentials_refuses_private_calls() {
        let client =
            KrakenClient::public_only(&KrakenConfig::default(), reqwest::Client::new());
        assert!(matches!(
            client.private(),
            Err(ExecutionError::AuthFailed(_))
        ));
    }

    #[test]
    fn test_invalid_secret_is_rejected_at_construction() {
        let credentials = ApiCredentials {
            key: "key".to_string(),
            secret: "not-base64!!!".to_string(),
        };
        let result = KrakenClient::new(
            &KrakenConfig::default(),
            &credentials,
            reqwest::Client::new(),
            None,
        );
        assert!(matches!(result, Err(ExecutionError::AuthFailed(_))));
    }
}
