use ladder_integration::error::SocketError;
use std::time::Duration;
use thiserror::Error;

/// Venue fault taxonomy surfaced by every [`ExchangeClient`](crate::client::ExchangeClient)
/// capability.
///
/// The distinction that matters to callers is [`Self::is_retryable`]: rate
/// limits and transport faults are worth retrying with backoff, everything
/// else is a permanent verdict for the submitted request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("unknown trading pair: {0}")]
    UnknownPair(String),

    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("invalid order precision: {0}")]
    InvalidPrecision(String),

    #[error("order below venue minimum size: {0}")]
    MinOrderSize(String),

    #[error("rate limited by venue")]
    RateLimited { retry_after: Option<Duration> },

    #[error("transient transport failure: {0}")]
    Transient(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("venue rejected request: {0}")]
    Other(String),
}

impl ExecutionError {
    /// Worth re-submitting after a backoff wait?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExecutionError::RateLimited { .. } | ExecutionError::Transient(_)
        )
    }

    /// Venue-suggested minimum wait before the next attempt, if it sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ExecutionError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<SocketError> for ExecutionError {
    fn from(error: SocketError) -> Self {
        match error {
            SocketError::HttpTimeout(_) => {
                ExecutionError::Transient("request deadline exceeded".to_string())
            }
            SocketError::Http(error) => ExecutionError::Transient(error.to_string()),
            SocketError::HttpResponse(status, body) => {
                if status.as_u16() == 429 {
                    ExecutionError::RateLimited { retry_after: None }
                } else if status.is_server_error() {
                    ExecutionError::Transient(format!("server error {status}: {body}"))
                } else {
                    ExecutionError::Other(format!("http {status}: {body}"))
                }
            }
            SocketError::Credentials(reason) => ExecutionError::AuthFailed(reason),
            other => ExecutionError::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_and_transient_are_retryable() {
        assert!(
            ExecutionError::RateLimited {
                retry_after: Some(Duration::from_secs(4))
            }
            .is_retryable()
        );
        assert!(ExecutionError::Transient("connection reset".to_string()).is_retryable());
    }

    #[test]
    fn test_permanent_kinds_are_not_retryable() {
        assert!(!ExecutionError::InsufficientBalance("XBT".to_string()).is_retryable());
        assert!(!ExecutionError::InvalidPrecision("volume".to_string()).is_retryable());
        assert!(!ExecutionError::AuthFailed("bad key".to_string()).is_retryable());
        assert!(!ExecutionError::UnknownPair("FOO/USD".to_string()).is_retryable());
    }

    #[test]
    fn test_socket_timeout_maps_to_transient() {
        let error = ExecutionError::from(SocketError::Exchange("EService:Busy".to_string()));
        assert!(matches!(error, ExecutionError::Other(_)));
    }
}
