//! Unified error type for the cache and rate-limit layer.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// Errors raised by the store adapter, the configuration layer and the
/// HTTP surface.
///
/// `CacheService` recovers `StoreUnavailable`, `Timeout` and
/// `Serialization` locally; they reach HTTP callers only through the
/// admin endpoints.
#[derive(Error, Debug)]
pub enum BcError {
    // ============ Store Errors ============
    /// Connection not ready, pool exhausted or I/O failure.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A store command did not complete within the command timeout.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Stored bytes could not be decoded, or a value could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ============ Request Errors ============
    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimitExceeded { retry_after: u64 },

    // ============ Infrastructure Errors ============
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BcError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::RateLimitExceeded { .. } => 429,
            Self::StoreUnavailable(_) | Self::Timeout(_) => 503,
            Self::Serialization(_) | Self::Configuration(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::Timeout(_) => "TIMEOUT",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a store-unavailable error.
    #[must_use]
    pub fn unavailable<T: Into<String>>(message: T) -> Self {
        Self::StoreUnavailable(message.into())
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// True for failures that mean "the store could not answer".
    ///
    /// These are the errors the cache layer degrades on instead of
    /// surfacing them to the wrapped request.
    #[must_use]
    pub const fn is_store_failure(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Timeout(_))
    }
}

impl From<serde_json::Error> for BcError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Serializable error response for API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl ErrorResponse {
    /// Creates a new error response from a `BcError`.
    #[must_use]
    pub fn from_error(error: &BcError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}

impl From<&BcError> for ErrorResponse {
    fn from(error: &BcError) -> Self {
        Self::from_error(error)
    }
}
