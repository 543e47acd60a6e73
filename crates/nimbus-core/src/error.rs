//! Error types for nimbus-core.
//!
//! # Recovery strategies
//!
//! | Error | Foreground fetch | Background tick |
//! |-------|------------------|-----------------|
//! | [`Error::Connectivity`] | Fall back to session, then persistent cache | Retry |
//! | [`Error::Timeout`] | Fall back to caches | Retry |
//! | [`Error::NoConnectivityNoCache`] | Surface "offline, no data" | Retry |
//! | [`Error::Upstream`] | Propagate (range history falls back to per-day calls) | Permanent failure |
//! | [`Error::Decode`] / [`Error::InvalidSnapshot`] | Propagate | Permanent failure |
//! | [`Error::Storage`] | Logged and swallowed on housekeeping paths | Permanent failure |
//!
//! Only errors that leave the caller with no data at all reach the caller;
//! partial historical failures and cache maintenance errors are logged at
//! `warn` and never returned.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the reconciliation engine and its collaborators.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No network, or a transport-level failure talking to the API.
    #[error("Network unavailable: {0}")]
    Connectivity(String),

    /// Offline and neither cache holds data for the query.
    #[error("No network connection and no cached weather for '{query}'")]
    NoConnectivityNoCache { query: String },

    /// The API was reachable but returned an unusable response.
    #[error("Weather service error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("Failed to decode weather response: {0}")]
    Decode(String),

    /// The payload decoded but has the wrong shape for its endpoint.
    #[error("Invalid weather payload: {0}")]
    InvalidSnapshot(#[from] nimbus_types::ParseError),

    /// Persistent store failure.
    #[error("Storage error: {0}")]
    Storage(#[from] nimbus_store::Error),

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// The current-location entry cannot be removed.
    #[error("Location '{0}' cannot be removed")]
    ProtectedLocation(String),

    #[error("Location not found: {0}")]
    LocationNotFound(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether this failure means "could not reach the network".
    ///
    /// Connectivity failures trigger cache fallback in the foreground and a
    /// retry in the background.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Error::Connectivity(_) | Error::Timeout { .. } | Error::NoConnectivityNoCache { .. }
        )
    }

    /// Text suitable for showing to a user.
    pub fn user_message(&self) -> String {
        match self {
            Error::NoConnectivityNoCache { .. } => {
                "You're offline and no saved weather is available for this location.".to_string()
            }
            Error::Connectivity(_) | Error::Timeout { .. } => {
                "Couldn't reach the weather service. Check your connection.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout {
                operation: err
                    .url()
                    .map(|u| u.path().to_string())
                    .unwrap_or_else(|| "request".to_string()),
                duration: Duration::ZERO,
            }
        } else if err.is_decode() {
            Error::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Error::Upstream {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            // Connect, request and body errors are all transport-level
            Error::Connectivity(err.to_string())
        }
    }
}

/// Result type alias using nimbus-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NoConnectivityNoCache {
            query: "Paris".to_string(),
        };
        assert!(err.to_string().contains("Paris"));

        let err = Error::Upstream {
            status: 403,
            message: "plan does not allow end_dt".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Weather service error (403): plan does not allow end_dt"
        );

        let err = Error::timeout("forecast", Duration::from_secs(15));
        assert!(err.to_string().contains("forecast"));
        assert!(err.to_string().contains("15s"));
    }

    #[test]
    fn test_connectivity_classification() {
        assert!(Error::Connectivity("dns".into()).is_connectivity());
        assert!(Error::timeout("x", Duration::from_secs(1)).is_connectivity());
        assert!(
            Error::NoConnectivityNoCache {
                query: "q".into()
            }
            .is_connectivity()
        );
        assert!(
            !Error::Upstream {
                status: 500,
                message: String::new()
            }
            .is_connectivity()
        );
        assert!(!Error::Decode("eof".into()).is_connectivity());
        assert!(!Error::Cancelled.is_connectivity());
    }

    #[test]
    fn test_user_message() {
        let err = Error::NoConnectivityNoCache {
            query: "q".into(),
        };
        assert!(err.user_message().contains("offline"));

        let err = Error::LocationNotFound("abc".into());
        assert_eq!(err.user_message(), "Location not found: abc");
    }

    #[test]
    fn test_from_parse_error() {
        let err: Error = nimbus_types::ParseError::HistoricalDayCount { actual: 2 }.into();
        assert!(matches!(err, Error::InvalidSnapshot(_)));
        assert!(!err.is_connectivity());
    }
}
