use crate::{
    error::SocketError,
    metric::{Field, Metric, Tag},
    protocol::http::{BuildStrategy, HttpParser, rest::RestRequest},
};
use bytes::Bytes;
use chrono::Utc;
use std::{borrow::Cow, time::Duration};
use tracing::debug;

/// Default deadline applied to every request unless replaced via
/// [`RestClient::with_request_timeout`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Configurable REST client capable of executing signed [`RestRequest`]s.
///
/// Each API requires a specific combination of [`BuildStrategy`] (public, or
/// a [`RequestSigner`](super::super::private::RequestSigner) wrapping a keyed
/// [`Mac`](hmac::Mac)) and [`HttpParser`].
#[derive(Debug)]
pub struct RestClient<'a, Strategy, Parser> {
    /// HTTP [`reqwest::Client`] used to execute the built [`reqwest::Request`]s.
    pub http_client: reqwest::Client,

    /// Base Url of the API being interacted with.
    pub base_url: Cow<'a, str>,

    /// [`RestRequest`] build strategy implementing [`BuildStrategy`].
    pub strategy: Strategy,

    /// [`HttpParser`] deserialising [`RestRequest::Response`]s, and upon
    /// failure parsing API errors returned from the server.
    pub parser: Parser,

    /// Hard deadline applied to each request, injected from configuration.
    pub request_timeout: Duration,
}

impl<Strategy, Parser> RestClient<'_, Strategy, Parser>
where
    Strategy: BuildStrategy,
    Parser: HttpParser,
{
    /// Execute the provided [`RestRequest`], emitting the round-trip latency
    /// [`Metric`] at debug level.
    pub async fn execute<Request>(
        &self,
        request: Request,
    ) -> Result<Request::Response, Parser::OutputError>
    where
        Request: RestRequest,
    {
        let request = self.build(request)?;

        let (status, payload, latency) = self.measured_execution::<Request>(request).await?;
        debug!(?latency, "executed venue request");

        self.parser.parse::<Request::Response>(status, &payload)
    }

    /// Use the provided [`RestRequest`] to construct a [`reqwest::Request`]
    /// ready for execution, signed if the strategy requires it.
    pub fn build<Request>(&self, request: Request) -> Result<reqwest::Request, SocketError>
    where
        Request: RestRequest,
    {
        let url = format!("{}{}", self.base_url, request.path());

        let mut builder = self
            .http_client
            .request(Request::method(), url)
            .timeout(self.request_timeout);

        if let Some(query_params) = request.query_params() {
            builder = builder.query(query_params);
        }

        // Private spot-exchange endpoints take form-urlencoded bodies
        if let Some(body) = request.body() {
            builder = builder.form(body);
        }

        self.strategy.build(request, builder)
    }

    /// Execute the built [`reqwest::Request`], measuring the round trip
    /// duration.
    pub async fn measured_execution<Request>(
        &self,
        request: reqwest::Request,
    ) -> Result<(reqwest::StatusCode, Bytes, Metric), SocketError>
    where
        Request: RestRequest,
    {
        let mut latency = Metric {
            name: "http_request_duration",
            time: Utc::now().timestamp_millis() as u64,
            tags: vec![
                Tag::new("http_method", Request::method().as_str()),
                Tag::new("base_url", self.base_url.as_ref()),
                Tag::new("path", request.url().path()),
            ],
            fields: Vec::with_capacity(1),
        };

        let start = std::time::Instant::now();
        let response = self.http_client.execute(request).await?;
        let duration = start.elapsed().as_millis() as u64;

        latency
            .tags
            .push(Tag::new("status_code", response.status().as_str()));
        latency.fields.push(Field::new("duration", duration));

        let status_code = response.status();
        let payload = response.bytes().await?;

        Ok((status_code, payload, latency))
    }
}

impl<'a, Strategy, Parser> RestClient<'a, Strategy, Parser> {
    /// Construct a new [`Self`] using the provided configuration and the
    /// [`DEFAULT_REQUEST_TIMEOUT`].
    pub fn new<Url: Into<Cow<'a, str>>>(base_url: Url, strategy: Strategy, parser: Parser) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into(),
            strategy,
            parser,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Replace the default request deadline (eg/ from injected configuration).
    pub fn with_request_timeout(self, request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            ..self
        }
    }

    /// Share an existing [`reqwest::Client`] connection pool.
    pub fn with_http_client(self, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            ..self
        }
    }
}
