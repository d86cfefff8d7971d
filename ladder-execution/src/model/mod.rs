use crate::error::ExecutionError;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;
use std::str::FromStr;

/// Account balances and the WebSocket-fed [`BalanceCache`](balance::BalanceCache).
pub mod balance;

/// Market data payloads: [`Ticker`](market::Ticker) and [`Candle`](market::Candle).
pub mod market;

/// Order submission and verification payloads.
pub mod order;

/// Asset in display form, eg/ `BTC`, `USD`.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Asset(SmolStr);

impl Asset {
    pub fn new<S: AsRef<str>>(name: S) -> Self {
        Self(SmolStr::new(name.as_ref().to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<&str> for Asset {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Trading pair in display form, eg/ `BTC/USD`.
///
/// Serialises as its display string so persisted documents stay readable.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Symbol {
    pub base: Asset,
    pub quote: Asset,
}

impl Symbol {
    pub fn new<B, Q>(base: B, quote: Q) -> Self
    where
        B: Into<Asset>,
        Q: Into<Asset>,
    {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for Symbol {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() => {
                Ok(Self::new(base, quote))
            }
            _ => Err(ExecutionError::UnknownPair(s.to_string())),
        }
    }
}

impl Serialize for Symbol {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Venue-native pair identifier, eg/ `XXBTZUSD`.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ExchangePair(SmolStr);

impl ExchangePair {
    pub fn new<S: AsRef<str>>(pair: S) -> Self {
        Self(SmolStr::new(pair.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ExchangePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<&str> for ExchangePair {
    fn from(pair: &str) -> Self {
        Self::new(pair)
    }
}

/// Venue-assigned transaction id of an accepted order.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct TxId(SmolStr);

impl TxId {
    pub fn new<S: AsRef<str>>(txid: S) -> Self {
        Self(SmolStr::new(txid.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<&str> for TxId {
    fn from(txid: &str) -> Self {
        Self::new(txid)
    }
}

/// Buy or sell, from the perspective of the base asset.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("buy"),
            Side::Sell => f.write_str("sell"),
        }
    }
}

/// Supported order kinds.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Market,
    Limit,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Market => f.write_str("market"),
            OrderKind::Limit => f.write_str("limit"),
        }
    }
}
