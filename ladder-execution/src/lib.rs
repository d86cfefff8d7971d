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

//! Spot-exchange adapter for the ladder trading system.
//!
//! Everything above this crate speaks the normalised domain model defined in
//! [`model`]: display symbols (`BTC/USD`), venue pairs (`XXBTZUSD`), decimal
//! volumes and balances. The [`client::ExchangeClient`] trait is the only
//! surface through which the rest of the system reaches an exchange:
//!
//! - [`client::kraken::KrakenClient`] - the live Kraken implementation with
//!   signed private endpoints, pair normalisation, precision handling, the
//!   fee-buffer sell clamp and the REST/cache balance merge.
//! - [`client::mock::MockExchange`] - a scriptable implementation used by
//!   integration tests.
//!
//! All venue faults are collapsed into the [`error::ExecutionError`] taxonomy
//! so callers can decide between retry and permanent failure without knowing
//! venue specifics.

/// Venue fault taxonomy surfaced to order-execution callers.
pub mod error;

/// Normalised domain model: assets, symbols, orders, balances, market data.
pub mod model;

/// [`ExchangeClient`](client::ExchangeClient) trait and its implementations.
pub mod client;
