//! # bc-core
//!
//! Error taxonomy, result aliases and logging bootstrap shared by every
//! crate of the cache and rate-limit layer.

pub mod error;
pub mod result;
pub mod telemetry;

pub use error::*;
pub use result::*;
pub use telemetry::*;
