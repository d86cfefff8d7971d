use crate::client::kraken::http::KrakenResponse;
use derive_more::Constructor;
use fnv::FnvHashMap;
use ladder_integration::protocol::http::rest::RestRequest;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use std::borrow::Cow;

/// https://docs.kraken.com/api/docs/rest-api/get-ticker-information
#[derive(Debug, Clone, Constructor)]
pub struct GetTickerRequest(TickerParams);

#[derive(Debug, Clone, Serialize, Constructor)]
pub struct TickerParams {
    pub pair: String,
}

impl RestRequest for GetTickerRequest {
    type Response = KrakenResponse<TickerResult>;
    type QueryParams = TickerParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        "/0/public/Ticker".into()
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

/// Result map keyed by venue pair name.
#[derive(Debug, Deserialize)]
pub struct TickerResult(pub FnvHashMap<String, TickerPayload>);

/// Kraken encodes each quote as an array of decimal strings.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPayload {
    /// `[price, whole lot volume, lot volume]`
    #[serde_as(as = "Vec<DisplayFromStr>")]
    #[serde(rename = "a")]
    pub ask: Vec<Decimal>,

    /// `[price, whole lot volume, lot volume]`
    #[serde_as(as = "Vec<DisplayFromStr>")]
    #[serde(rename = "b")]
    pub bid: Vec<Decimal>,

    /// `[price, lot volume]` of the most recent trade.
    #[serde_as(as = "Vec<DisplayFromStr>")]
    #[serde(rename = "c")]
    pub last: Vec<Decimal>,
}
