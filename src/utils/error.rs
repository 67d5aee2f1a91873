//! Error taxonomy for the gateway.
//!
//! Every fallible core operation returns [`Result<T>`]. The taxonomy is
//! intentionally small: callers branch on the *kind* (validation vs timeout
//! vs internal), never on the message text, except for the auth/config
//! carve-out documented on [`GatewayError::is_retryable`].

use thiserror::Error;

/// Result type alias used throughout the gateway core.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Tagged error kinds for the gateway's fallible operations.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// The request violates a precondition: missing key, unknown model,
    /// schema violation. Never retryable, never trips a circuit.
    #[error("validation error: {0}")]
    Validation(String),

    /// An upstream call exceeded its deadline. Retryable, trips the circuit.
    #[error("timeout error: {0}")]
    Timeout(String),

    /// Any other upstream failure: HTTP 5xx, connection reset, malformed
    /// response, rate limiting. Retryable unless the message indicates an
    /// auth/configuration defect (see [`GatewayError::is_retryable`]).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Substrings that mark an `Internal` error as a configuration defect
/// rather than a transient failure: matched case-insensitively, and only
/// as a secondary signal when the error already carries the `Internal`
/// tag.
const CONFIG_DEFECT_MARKERS: &[&str] = &[
    "invalid api key",
    "api key not configured",
    "not configured",
];

impl GatewayError {
    /// Build a [`GatewayError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`GatewayError::Timeout`].
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Build a [`GatewayError::Internal`].
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether a failed call may be retried against the next provider in a
    /// fallback list. Validation errors never are; timeouts always are;
    /// internal errors are, unless the message names a config defect.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Validation(_) => false,
            GatewayError::Timeout(_) => true,
            GatewayError::Internal(msg) => {
                let lower = msg.to_lowercase();
                !CONFIG_DEFECT_MARKERS
                    .iter()
                    .any(|marker| lower.contains(marker))
            }
        }
    }

    /// Whether this error counts as a circuit-breaker failure. Validation
    /// errors do not trip the circuit (the provider isn't unhealthy, the
    /// caller's request was malformed).
    pub fn trips_circuit(&self) -> bool {
        !matches!(self, GatewayError::Validation(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(err.to_string())
        } else {
            GatewayError::Internal(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Internal(format!("serialization error: {err}"))
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Internal(format!("io error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_never_retryable() {
        let err = GatewayError::validation("missing key");
        assert!(!err.is_retryable());
        assert!(!err.trips_circuit());
    }

    #[test]
    fn timeout_is_always_retryable() {
        let err = GatewayError::timeout("deadline exceeded");
        assert!(err.is_retryable());
        assert!(err.trips_circuit());
    }

    #[test]
    fn internal_is_retryable_unless_config_defect() {
        assert!(GatewayError::internal("rate limit 429").is_retryable());
        assert!(!GatewayError::internal("Invalid API Key provided").is_retryable());
        assert!(!GatewayError::internal("API key not configured for provider").is_retryable());
        assert!(!GatewayError::internal("model is not configured").is_retryable());
    }

    #[test]
    fn internal_still_trips_circuit_even_when_not_retryable() {
        // A config defect isn't the provider being unhealthy in the
        // transient sense, but it is still a call failure the circuit
        // breaker should count.
        let err = GatewayError::internal("invalid api key");
        assert!(err.trips_circuit());
        assert!(!err.is_retryable());
    }
}
