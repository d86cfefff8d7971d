use serde::{Serialize, de::DeserializeOwned};

/// Configurable [`client::RestClient`] capable of executing signed
/// [`RestRequest`]s and parsing responses.
pub mod client;

/// Http REST request that can be executed by a [`RestClient`](client::RestClient).
///
/// Follows the conventions of the Kraken-style spot APIs this crate targets:
/// public endpoints are GETs carrying query-string parameters, private
/// endpoints are POSTs carrying `application/x-www-form-urlencoded` bodies.
/// The request deadline is owned by the client - one injected setting for the
/// whole venue - rather than by individual requests.
pub trait RestRequest {
    /// Expected response type if this request was successful.
    type Response: DeserializeOwned;

    /// Serialisable query parameters type - use unit struct () if not required
    /// for this request.
    type QueryParams: Serialize;

    /// Serialisable form body type - use unit struct () if not required for
    /// this request.
    type Body: Serialize;

    /// Additional [`Url`](url::Url) path to the resource.
    fn path(&self) -> std::borrow::Cow<'static, str>;

    /// Http [`reqwest::Method`] of this request: GET unless a private
    /// endpoint overrides to POST.
    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }

    /// Optional query parameters for this request.
    fn query_params(&self) -> Option<&Self::QueryParams> {
        None
    }

    /// Optional form body for this request.
    fn body(&self) -> Option<&Self::Body> {
        None
    }
}
