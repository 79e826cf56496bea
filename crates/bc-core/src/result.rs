//! Result type aliases.

use crate::BcError;

/// A specialized `Result` type for cache-layer operations.
pub type BcResult<T> = Result<T, BcError>;
