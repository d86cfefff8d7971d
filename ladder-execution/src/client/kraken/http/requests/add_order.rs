use crate::{
    client::kraken::http::KrakenResponse,
    model::{OrderKind, Side},
};
use derive_more::Constructor;
use ladder_integration::protocol::http::rest::RestRequest;
use reqwest::Method;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as, skip_serializing_none};
use std::borrow::Cow;

/// Fee taken in base currency (buys).
pub const OFLAG_FEE_IN_BASE: &str = "fcib";

/// Fee taken in quote currency (sells).
pub const OFLAG_FEE_IN_QUOTE: &str = "fciq";

/// https://docs.kraken.com/api/docs/rest-api/add-order
#[derive(Debug, Clone, Constructor)]
pub struct AddOrderRequest(AddOrderBody);

/// `nonce` must serialise first: the signer reads it off the encoded body.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Constructor)]
pub struct AddOrderBody {
    pub nonce: u64,

    pub pair: String,

    #[serde(rename = "type")]
    pub side: Side,

    pub ordertype: OrderKind,

    #[serde_as(as = "DisplayFromStr")]
    pub volume: Decimal,

    #[serde_as(as = "Option<DisplayFromStr>")]
    pub price: Option<Decimal>,

    pub oflags: &'static str,
}

impl RestRequest for AddOrderRequest {
    type Response = KrakenResponse<AddOrderResult>;
    type QueryParams = ();
    type Body = AddOrderBody;

    fn path(&self) -> Cow<'static, str> {
        "/0/private/AddOrder".into()
    }

    fn method() -> Method {
        Method::POST
    }

    fn body(&self) -> Option<&Self::Body> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddOrderResult {
    #[serde(default)]
    pub txid: Vec<String>,

    pub descr: Option<AddOrderDescription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddOrderDescription {
    pub order: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_add_order_body_form_encoding() {
        let body = AddOrderBody::new(
            1616492376594,
            "XXBTZUSD".to_string(),
            Side::Buy,
            OrderKind::Market,
            dec!(0.0002),
            None,
            OFLAG_FEE_IN_BASE,
        );

        assert_eq!(
            serde_urlencoded::to_string(&body).unwrap(),
            "nonce=1616492376594&pair=XXBTZUSD&type=buy&ordertype=market&volume=0.0002&oflags=fcib"
        );
    }

    #[test]
    fn test_add_order_body_includes_limit_price() {
        let body = AddOrderBody::new(
            7,
            "SOLUSD".to_string(),
            Side::Sell,
            OrderKind::Limit,
            dec!(1.5),
            Some(dec!(210.42)),
            OFLAG_FEE_IN_QUOTE,
        );

        assert_eq!(
            serde_urlencoded::to_string(&body).unwrap(),
            "nonce=7&pair=SOLUSD&type=sell&ordertype=limit&volume=1.5&price=210.42&oflags=fciq"
        );
    }

    #[test]
    fn test_add_order_deserialise() {
        let raw = r#"{
            "error": [],
            "result": {
                "descr": {"order": "buy 0.00020000 XBTUSD @ market"},
                "txid": ["OUF4EM-FRGI2-MQMWZD"]
            }
        }"#;

        let response: KrakenResponse<AddOrderResult> = serde_json::from_str(raw).unwrap();
        let result = response.into_result().unwrap();

        assert_eq!(result.txid, vec!["OUF4EM-FRGI2-MQMWZD".to_string()]);
        assert!(result.descr.unwrap().order.starts_with("buy"));
    }
}
