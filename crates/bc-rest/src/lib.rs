//! # bc-rest
//!
//! HTTP surface of the cache and rate-limit layer: axum middleware that
//! wraps route handlers with response caching, invalidation and request
//! quotas, plus health and cache admin endpoints.

pub mod controllers;
pub mod middleware;
pub mod responses;
pub mod router;
pub mod state;

pub use router::*;
pub use state::*;
