use self::rest::RestRequest;
use crate::error::SocketError;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::error;

/// Defines an abstract [`RestRequest`] that can be executed by a fully
/// configurable [`RestClient`](rest::client::RestClient).
pub mod rest;

/// Defines a configurable [`RequestSigner`](private::RequestSigner) that signs
/// Http [`RestRequest`]s using API specific logic.
pub mod private;

/// [`RestRequest`] build strategy for the API being interacted with.
///
/// Private endpoints go through the configurable
/// [`RequestSigner`](private::RequestSigner); public market-data endpoints use
/// [`PublicNoHeaders`].
pub trait BuildStrategy {
    /// Use a [`RestRequest`] and [`reqwest::RequestBuilder`] to construct a
    /// [`reqwest::Request`] that is ready for executing.
    fn build<Request>(
        &self,
        request: Request,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Request, SocketError>
    where
        Request: RestRequest;
}

/// Build strategy for public market-data endpoints: no authentication, no
/// additional headers.
#[derive(Debug, Copy, Clone)]
pub struct PublicNoHeaders;

impl BuildStrategy for PublicNoHeaders {
    fn build<Request>(
        &self,
        _: Request,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Request, SocketError>
    where
        Request: RestRequest,
    {
        builder.build().map_err(SocketError::from)
    }
}

/// Utilised by a [`RestClient`](rest::client::RestClient) to deserialise
/// [`RestRequest::Response`]s, and upon failure parse API errors returned from
/// the server.
pub trait HttpParser {
    type ApiError: DeserializeOwned;
    type OutputError: From<SocketError>;

    /// Attempt to parse a [`StatusCode`] & bytes payload into a deserialisable
    /// `Response`.
    ///
    /// Kraken-style venues report faults inside a `200 OK` envelope, so the
    /// typed `Response` is always attempted first regardless of status; only
    /// when that fails is the payload read as [`Self::ApiError`].
    fn parse<Response>(
        &self,
        status: StatusCode,
        payload: &[u8],
    ) -> Result<Response, Self::OutputError>
    where
        Response: DeserializeOwned,
    {
        if payload.is_empty() {
            return Err(Self::OutputError::from(SocketError::HttpResponse(
                status,
                "empty response body".to_string(),
            )));
        }

        let response_error = match serde_json::from_slice::<Response>(payload) {
            Ok(response) => return Ok(response),
            Err(serde_error) => serde_error,
        };

        if let Ok(api_error) = serde_json::from_slice::<Self::ApiError>(payload) {
            return Err(self.parse_api_error(status, api_error));
        }

        // Neither shape fits: surface the raw payload for the operator
        error!(
            status_code = ?status,
            ?response_error,
            response_body = %String::from_utf8_lossy(payload),
            "error deserialising HTTP response"
        );

        Err(Self::OutputError::from(SocketError::DeserialiseBinary {
            error: response_error,
            payload: payload.to_vec(),
        }))
    }

    /// If [`parse`](Self::parse) fails to deserialise the `Ok(Response)`, this
    /// function parses the API [`Self::ApiError`] associated with the response.
    fn parse_api_error(&self, status: StatusCode, error: Self::ApiError) -> Self::OutputError;
}
