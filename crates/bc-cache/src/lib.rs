//! # bc-cache
//!
//! Cache-aside caching and fixed-window rate limiting over a remote
//! key-value store.
//!
//! - [`store`]: the [`KeyValueStore`] contract, the Redis adapter and an
//!   in-process store.
//! - [`keys`]: key composition under the application prefix.
//! - [`CacheService`]: best-effort get/set/delete, `get_or_compute`,
//!   per-domain helpers and the rate-limit counter.

pub mod keys;
pub mod metrics;
mod rate_limit;
mod service;
pub mod store;
mod ttl_policy;

pub use keys::{KeyBuilder, Namespace};
pub use rate_limit::RateLimitDecision;
pub use service::{CacheService, CacheStatus, Cached, VerificationChannel};
pub use store::{ConnectionState, KeyTtl, KeyValueStore, MemoryStore, RedisStore};
pub use ttl_policy::{TtlPolicy, DEFAULT_RATE_LIMIT_WINDOW};
