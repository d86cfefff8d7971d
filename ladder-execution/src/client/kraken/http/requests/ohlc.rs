use crate::client::kraken::http::KrakenResponse;
use derive_more::Constructor;
use fnv::FnvHashMap;
use ladder_integration::protocol::http::rest::RestRequest;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use std::borrow::Cow;

/// https://docs.kraken.com/api/docs/rest-api/get-ohlc-data
#[derive(Debug, Clone, Constructor)]
pub struct GetOhlcRequest(OhlcParams);

#[derive(Debug, Clone, Serialize, Constructor)]
pub struct OhlcParams {
    pub pair: String,

    /// Candle width in minutes.
    pub interval: u32,
}

impl RestRequest for GetOhlcRequest {
    type Response = KrakenResponse<OhlcResult>;
    type QueryParams = OhlcParams;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        "/0/public/OHLC".into()
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

/// The `last` cursor plus one candle series per requested pair.
#[derive(Debug, Deserialize)]
pub struct OhlcResult {
    pub last: u64,

    #[serde(flatten)]
    pub candles: FnvHashMap<String, Vec<OhlcRow>>,
}

/// `[time, open, high, low, close, vwap, volume, count]`
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct OhlcRow(
    pub i64,
    #[serde_as(as = "DisplayFromStr")] pub Decimal,
    #[serde_as(as = "DisplayFromStr")] pub Decimal,
    #[serde_as(as = "DisplayFromStr")] pub Decimal,
    #[serde_as(as = "DisplayFromStr")] pub Decimal,
    #[serde_as(as = "DisplayFromStr")] pub Decimal,
    #[serde_as(as = "DisplayFromStr")] pub Decimal,
    pub u64,
);

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ohlc_deserialise() {
        let raw = r#"{
            "error": [],
            "result": {
                "XETHZUSD": [
                    [1688671200, "1800.1", "1810.0", "1795.5", "1805.2", "1802.7", "120.5", 342]
                ],
                "last": 1688671200
            }
        }"#;

        let response: KrakenResponse<OhlcResult> = serde_json::from_str(raw).unwrap();
        let result = response.into_result().unwrap();

        assert_eq!(result.last, 1688671200);
        let rows = result.candles.get("XETHZUSD").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, 1688671200);
        assert_eq!(rows[0].4, dec!(1805.2));
        assert_eq!(rows[0].7, 342);
    }
}
