//! Error types for weather payload handling in nimbus-types.

use thiserror::Error;

/// Errors that can occur when interpreting a weather payload.
///
/// This error type is transport-agnostic and does not include
/// HTTP-specific errors (those belong in nimbus-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A forecast payload arrived without its current-conditions block.
    #[error("Forecast payload for '{location}' has no current conditions")]
    MissingCurrent {
        /// Location name reported by the payload.
        location: String,
    },

    /// A historical snapshot must hold exactly one day.
    #[error("Historical snapshot must contain exactly one day, got {actual}")]
    HistoricalDayCount {
        /// Number of day entries found.
        actual: usize,
    },

    /// A date string was not in `yyyy-MM-dd` form.
    #[error("Invalid date '{0}': expected yyyy-MM-dd")]
    InvalidDate(String),

    /// Any other malformed value.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias using nimbus-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
