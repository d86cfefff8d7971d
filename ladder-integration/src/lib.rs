#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! Low-level plumbing for building signed REST integrations with spot crypto
//! exchanges.
//!
//! The crate provides the building blocks a venue adapter composes:
//! - [`protocol::http::rest::RestRequest`] describes a single endpoint.
//! - [`protocol::http::rest::client::RestClient`] executes requests with a
//!   pluggable [`protocol::http::BuildStrategy`] (public, or signed via
//!   [`protocol::http::private::RequestSigner`]) and a pluggable
//!   [`protocol::http::HttpParser`].
//! - [`error::SocketError`] is the transport-level error taxonomy.

/// Transport and (de)serialisation errors surfaced by this crate.
pub mod error;

/// Request latency [`Metric`](metric::Metric) emitted alongside responses.
pub mod metric;

/// Http protocol abstractions: REST requests, signing, parsing.
pub mod protocol;
