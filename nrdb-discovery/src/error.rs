//! Error types for the discovery engine.
//!
//! Every failure in the engine is returned as a [`DiscoveryError`]. Callers that
//! need to decide whether to retry, back off or give up should use
//! [`DiscoveryError::class`] instead of matching on individual variants.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Result type for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Coarse classification of an error, used by the retry policy and by
/// protocol adapters that translate errors into user-visible responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Network, timeout, rate-limit and gateway failures. Retried locally.
    Transient,
    /// Authentication, validation and not-found failures. Never retried.
    Permanent,
    /// The circuit breaker rejected the call without touching the network.
    CircuitOpen,
    /// The caller's deadline elapsed or the operation was cancelled.
    Cancelled,
    /// Invalid engine or client configuration.
    Configuration,
}

/// Errors that can occur while discovering, sampling or analyzing event data.
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    /// The remote query did not complete in time.
    #[error("Query timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// The connection to the remote store could not be established or was reset.
    #[error("Connection failed: {message}")]
    Connection { message: String },

    /// The remote store throttled the request.
    #[error("Rate limited by remote store. Retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    /// The remote store answered with an unexpected HTTP status.
    #[error("Remote store returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Credentials were rejected (401/403).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The requested account, event type or endpoint does not exist.
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// The query statement or its parameters were rejected.
    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },

    /// The circuit breaker is open and the call was rejected immediately.
    #[error("Circuit breaker is open, retry in {retry_in:?}")]
    CircuitOpen { retry_in: Duration },

    /// The caller's deadline elapsed or the operation was cancelled.
    #[error("Operation cancelled: {reason}")]
    Cancelled { reason: String },

    /// Response payload could not be (de)serialized.
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Invalid configuration.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// No records were available for the given event type.
    #[error("No data available for event type '{event_type}'")]
    NoData { event_type: String },

    /// Identifier or input validation failed.
    #[error("Security validation failed: {0}")]
    Security(String),

    /// Statistical analysis could not be completed.
    #[error("Analysis failed: {0}")]
    Analysis(String),

    /// Any other failure. Treated as permanent.
    #[error("{0}")]
    Other(String),
}

impl DiscoveryError {
    /// Builds an error from an HTTP status code and response body.
    pub fn from_status(status: u16, message: impl Into<String>, retry_after: Option<u64>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Authentication { message },
            404 => Self::NotFound { message },
            400 | 422 => Self::InvalidQuery { message },
            429 => Self::RateLimited {
                retry_after_secs: retry_after,
            },
            _ => Self::Http { status, message },
        }
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection {
            message: msg.into(),
        }
    }

    /// Creates an invalid query error with the given message.
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: msg.into(),
        }
    }

    /// Creates a configuration error with the given message.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Creates a cancellation error with the given reason.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Creates an analysis error with the given message.
    pub fn analysis(msg: impl Into<String>) -> Self {
        Self::Analysis(msg.into())
    }

    /// Classifies this error for retry and reporting decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Timeout { .. } | Self::Connection { .. } | Self::RateLimited { .. } => {
                ErrorClass::Transient
            }
            Self::Http { status, .. } if matches!(*status, 502..=504) => ErrorClass::Transient,
            Self::CircuitOpen { .. } => ErrorClass::CircuitOpen,
            Self::Cancelled { .. } => ErrorClass::Cancelled,
            Self::Configuration { .. } => ErrorClass::Configuration,
            // Unknown failure modes fail fast instead of being masked by retries.
            _ => ErrorClass::Permanent,
        }
    }

    /// Returns true if this error is transient and the operation should be retried.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Returns true if this error was produced by an open circuit breaker.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Returns the server-suggested retry delay, if available.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DiscoveryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for DiscoveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                elapsed: Duration::ZERO,
            }
        } else if err.is_connect() || err.is_request() {
            Self::Connection {
                message: err.to_string(),
            }
        } else if err.is_decode() {
            Self::Serialization {
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), err.to_string(), None)
        } else {
            Self::Other(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            DiscoveryError::from_status(401, "bad key", None),
            DiscoveryError::Authentication { .. }
        ));
        assert!(matches!(
            DiscoveryError::from_status(403, "forbidden", None),
            DiscoveryError::Authentication { .. }
        ));
        assert!(matches!(
            DiscoveryError::from_status(404, "missing", None),
            DiscoveryError::NotFound { .. }
        ));
        assert!(matches!(
            DiscoveryError::from_status(429, "slow down", Some(3)),
            DiscoveryError::RateLimited {
                retry_after_secs: Some(3)
            }
        ));
    }

    #[test]
    fn test_retryable_classification() {
        for status in [429, 502, 503, 504] {
            assert!(
                DiscoveryError::from_status(status, "", None).is_retryable(),
                "status {status} should be retryable"
            );
        }
        for status in [400, 401, 403, 404, 500] {
            assert!(
                !DiscoveryError::from_status(status, "", None).is_retryable(),
                "status {status} should not be retryable"
            );
        }
        assert!(DiscoveryError::connection("reset").is_retryable());
        assert!(DiscoveryError::Timeout {
            elapsed: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(!DiscoveryError::Other("mystery".to_string()).is_retryable());
    }

    #[test]
    fn test_circuit_open_is_distinct() {
        let err = DiscoveryError::CircuitOpen {
            retry_in: Duration::from_secs(5),
        };
        assert!(err.is_circuit_open());
        assert_eq!(err.class(), ErrorClass::CircuitOpen);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retry_after() {
        let err = DiscoveryError::RateLimited {
            retry_after_secs: Some(7),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(DiscoveryError::connection("x").retry_after(), None);
    }
}
