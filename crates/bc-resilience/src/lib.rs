//! # bc-resilience
//!
//! Resilience primitives for the store adapter: capped reconnect backoff
//! with a bounded number of attempts, and per-command timeouts.

pub mod reconnect;
pub mod timeout;

pub use reconnect::*;
pub use timeout::*;
