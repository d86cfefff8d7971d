use crate::client::kraken::http::KrakenResponse;
use derive_more::Constructor;
use ladder_integration::protocol::http::rest::RestRequest;
use reqwest::Method;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use std::{borrow::Cow, collections::HashMap};

/// https://docs.kraken.com/api/docs/rest-api/get-account-balance
#[derive(Debug, Clone, Constructor)]
pub struct GetBalanceRequest(BalanceBody);

/// `nonce` must serialise first: the signer reads it off the encoded body.
#[derive(Debug, Clone, Serialize, Constructor)]
pub struct BalanceBody {
    pub nonce: u64,
}

impl RestRequest for GetBalanceRequest {
    type Response = KrakenResponse<BalanceResult>;
    type QueryParams = ();
    type Body = BalanceBody;

    fn path(&self) -> Cow<'static, str> {
        "/0/private/Balance".into()
    }

    fn method() -> Method {
        Method::POST
    }

    fn body(&self) -> Option<&Self::Body> {
        Some(&self.0)
    }
}

/// Venue ledger asset code -> decimal balance string.
#[serde_as]
#[derive(Debug, Deserialize)]
pub struct BalanceResult(#[serde_as(as = "HashMap<_, DisplayFromStr>")] pub HashMap<String, Decimal>);
