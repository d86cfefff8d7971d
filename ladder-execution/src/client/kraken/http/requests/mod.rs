/// Private `Balance` endpoint.
pub mod balance;

/// Private `AddOrder` endpoint.
pub mod add_order;

/// Private `QueryOrders` endpoint.
pub mod query_orders;

/// Public `Ticker` endpoint.
pub mod ticker;

/// Public `OHLC` endpoint.
pub mod ohlc;
