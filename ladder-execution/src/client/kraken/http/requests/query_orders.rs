use crate::{client::kraken::http::KrakenResponse, model::order::ExchangeOrderStatus};
use derive_more::Constructor;
use ladder_integration::protocol::http::rest::RestRequest;
use reqwest::Method;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use std::{borrow::Cow, collections::HashMap};

/// https://docs.kraken.com/api/docs/rest-api/get-orders-info
#[derive(Debug, Clone, Constructor)]
pub struct QueryOrdersRequest(QueryOrdersBody);

/// `nonce` must serialise first: the signer reads it off the encoded body.
#[derive(Debug, Clone, Serialize, Constructor)]
pub struct QueryOrdersBody {
    pub nonce: u64,

    pub txid: String,
}

impl RestRequest for QueryOrdersRequest {
    type Response = KrakenResponse<QueryOrdersResult>;
    type QueryParams = ();
    type Body = QueryOrdersBody;

    fn path(&self) -> Cow<'static, str> {
        "/0/private/QueryOrders".into()
    }

    fn method() -> Method {
        Method::POST
    }

    fn body(&self) -> Option<&Self::Body> {
        Some(&self.0)
    }
}

/// Result map keyed by transaction id.
#[derive(Debug, Deserialize)]
pub struct QueryOrdersResult(pub HashMap<String, KrakenOrderInfo>);

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct KrakenOrderInfo {
    pub status: KrakenOrderStatus,

    #[serde_as(as = "DisplayFromStr")]
    #[serde(rename = "vol_exec")]
    pub executed_volume: Decimal,

    #[serde_as(as = "DisplayFromStr")]
    pub cost: Decimal,

    #[serde_as(as = "DisplayFromStr")]
    pub fee: Decimal,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KrakenOrderStatus {
    Pending,
    Open,
    Closed,
    Canceled,
    Expired,
}

impl From<KrakenOrderStatus> for ExchangeOrderStatus {
    fn from(status: KrakenOrderStatus) -> Self {
        match status {
            // Accepted but not yet in the book: not terminal
            KrakenOrderStatus::Pending | KrakenOrderStatus::Open => ExchangeOrderStatus::Open,
            KrakenOrderStatus::Closed => ExchangeOrderStatus::Closed,
            KrakenOrderStatus::Canceled => ExchangeOrderStatus::Canceled,
            KrakenOrderStatus::Expired => ExchangeOrderStatus::Expired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_query_orders_deserialise() {
        let raw = r#"{
            "error": [],
            "result": {
                "OUF4EM-FRGI2-MQMWZD": {
                    "status": "closed",
                    "vol_exec": "0.00020000",
                    "cost": "10.00212",
                    "fee": "0.01600"
                }
            }
        }"#;

        let response: KrakenResponse<QueryOrdersResult> = serde_json::from_str(raw).unwrap();
        let result = response.into_result().unwrap();
        let info = result.0.get("OUF4EM-FRGI2-MQMWZD").unwrap();

        assert_eq!(info.status, KrakenOrderStatus::Closed);
        assert_eq!(info.executed_volume, dec!(0.0002));
        assert_eq!(info.cost, dec!(10.00212));
        assert_eq!(info.fee, dec!(0.016));
    }

    #[test]
    fn test_pending_maps_to_open() {
        assert_eq!(
            ExchangeOrderStatus::from(KrakenOrderStatus::Pending),
            ExchangeOrderStatus::Open
        );
    }
}
