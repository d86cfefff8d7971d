use crate::error::ExecutionError;
use ladder_integration::protocol::http::HttpParser;
use serde::Deserialize;
use std::time::Duration;

pub mod requests;
pub mod signer;

/// Generic envelope wrapping every Kraken REST response.
#[derive(Debug, Deserialize)]
pub struct KrakenResponse<T> {
    #[serde(default)]
    pub error: Vec<String>,
    pub result: Option<T>,
}

impl<T> KrakenResponse<T> {
    /// Unwrap the payload, converting venue error strings into the
    /// [`ExecutionError`] taxonomy.
    pub fn into_result(self) -> Result<T, ExecutionError> {
        if !self.error.is_empty() {
            return Err(classify_errors(&self.error));
        }
        self.result
            .ok_or_else(|| ExecutionError::Other("response missing result".to_string()))
    }
}

/// Map Kraken `E...`-prefixed error strings onto the adapter fault taxonomy.
///
/// The first classifiable string wins; unrecognised strings collapse into
/// [`ExecutionError::Other`] with the full list preserved.
pub fn classify_errors(errors: &[String]) -> ExecutionError {
    for error in errors {
        if error.contains("Rate limit") || error.contains("Too many requests") {
            return ExecutionError::RateLimited {
                // The venue sends no Retry-After header; its counter decays
                // in a few seconds, so hint that as the floor
                retry_after: Some(Duration::from_secs(4)),
            };
        }
        if error.contains("Insufficient funds") || error.contains("Insufficient") {
            return ExecutionError::InsufficientBalance(error.clone());
        }
        if error.contains("Unknown asset pair") || error.contains("Unknown asset") {
            return ExecutionError::UnknownPair(error.clone());
        }
        if error.contains("Order minimum not met") || error.contains("volume minimum") {
            return ExecutionError::MinOrderSize(error.clone());
        }
        if error.contains("Invalid arguments:volume")
            || error.contains("Invalid arguments:price")
            || error.contains("Invalid price")
        {
            return ExecutionError::InvalidPrecision(error.clone());
        }
        if error.contains("Invalid key")
            || error.contains("Invalid signature")
            || error.contains("Invalid nonce")
            || error.contains("Permission denied")
        {
            return ExecutionError::AuthFailed(error.clone());
        }
        if error.contains("Unknown order") {
            return ExecutionError::OrderNotFound(error.clone());
        }
        if error.contains("EService:") || error.contains("Internal error") {
            return ExecutionError::Transient(error.clone());
        }
    }
    ExecutionError::Other(errors.join(", "))
}

/// Error-shaped payload Kraken returns when the typed `result` cannot be
/// produced: the same envelope with an empty `result`.
#[derive(Debug, Deserialize)]
pub struct KrakenHttpApiError {
    #[serde(default)]
    pub error: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct KrakenParser;

impl HttpParser for KrakenParser {
    type ApiError = KrakenHttpApiError;
    type OutputError = ExecutionError;

    fn parse_api_error(
        &self,
        status: reqwest::StatusCode,
        error: Self::ApiError,
    ) -> Self::OutputError {
        if !error.error.is_empty() {
            classify_errors(&error.error)
        } else if status.is_server_error() {
            ExecutionError::Transient(format!("server error {status}"))
        } else {
            ExecutionError::Other(format!("http {status}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit() {
        let error = classify_errors(&["EAPI:Rate limit exceeded".to_string()]);
        assert!(matches!(error, ExecutionError::RateLimited { .. }));
    }

    #[test]
    fn test_classify_insufficient_funds() {
        let error = classify_errors(&["EOrder:Insufficient funds".to_string()]);
        assert!(matches!(error, ExecutionError::InsufficientBalance(_)));
    }

    #[test]
    fn test_classify_unknown_pair() {
        let error = classify_errors(&["EQuery:Unknown asset pair".to_string()]);
        assert!(matches!(error, ExecutionError::UnknownPair(_)));
    }

    #[test]
    fn test_classify_auth_failures() {
        for raw in ["EAPI:Invalid key", "EAPI:Invalid signature", "EAPI:Invalid nonce"] {
            let error = classify_errors(&[raw.to_string()]);
            assert!(matches!(error, ExecutionError::AuthFailed(_)), "{raw}");
        }
    }

    #[test]
    fn test_classify_unrecognised_preserves_messages() {
        let error = classify_errors(&["EWeird:Something".to_string(), "EOther:Else".to_string()]);
        match error {
            ExecutionError::Other(message) => {
                assert!(message.contains("EWeird:Something"));
                assert!(message.contains("EOther:Else"));
            }
            other => panic!("expected Other, got {other:?}"),
        }
    }

    #[test]
    fn test_envelope_with_errors_refuses_result() {
        let raw = r#"{"error":["EOrder:Insufficient funds"],"result":{"txid":["ABC"]}}"#;
        let response: KrakenResponse<serde_json::Value> = serde_json::from_str(raw).unwrap();
        assert!(response.into_result().is_err());
    }

    #[test]
    fn test_envelope_without_result_is_other() {
        let raw = r#"{"error":[]}"#;
        let response: KrakenResponse<serde_json::Value> = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            response.into_result(),
            Err(ExecutionError::Other(_))
        ));
    }
}
