/// Http protocol abstractions: [`RestRequest`](http::rest::RestRequest),
/// [`RestClient`](http::rest::client::RestClient), request signing and
/// response parsing.
pub mod http;
