//! Fixed-window request counter.

use crate::keys::Namespace;
use crate::metrics::CacheMetrics;
use crate::store::{expiry_secs, KeyTtl};
use crate::ttl_policy::clamp;
use crate::CacheService;
use bc_core::{BcError, BcResult};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of one counted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests permitted per window.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Seconds until the window resets; zero when allowed.
    pub retry_after: u64,
}

impl RateLimitDecision {
    fn allowed(limit: u32, remaining: u32) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            retry_after: 0,
        }
    }

    fn denied(limit: u32, retry_after: u64) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            retry_after: retry_after.max(1),
        }
    }

    /// Decision used when the counter cannot be read.
    fn fail_open(limit: u32) -> Self {
        Self::allowed(limit, limit)
    }
}

impl CacheService {
    /// Counts one request against `identifier` and decides whether it may
    /// proceed.
    ///
    /// The identifier is split on `:` into key parts, so `auth:ana@x.io`
    /// lands under `{prefix}:ratelimit:auth:ana@x.io`. A window starts
    /// with the first request and lasts `window` (at least one second).
    ///
    /// Requests at the limit are denied without touching the counter.
    /// Below it the counter is incremented first and the returned count is
    /// compared afterwards, so racing callers may push the stored count past
    /// the limit but never more than `max_attempts` requests are allowed per
    /// window. Any store failure fails open.
    pub async fn increment_rate_limit(
        &self,
        identifier: &str,
        max_attempts: u32,
        window: Duration,
    ) -> RateLimitDecision {
        let key = self.keys.key(Namespace::RateLimit, identifier.split(':'));

        match self.count_request(&key, max_attempts, clamp(window)).await {
            Ok(decision) => {
                if decision.allowed {
                    CacheMetrics::rate_limit("allowed");
                } else {
                    CacheMetrics::rate_limit("denied");
                    debug!(key = %key, retry_after = decision.retry_after, "Rate limit exceeded");
                }
                decision
            }
            Err(e) => {
                CacheMetrics::rate_limit("fail_open");
                warn!(key = %key, error = %e, "Rate limit check failed, allowing request");
                RateLimitDecision::fail_open(max_attempts)
            }
        }
    }

    async fn count_request(
        &self,
        key: &str,
        max_attempts: u32,
        window: Duration,
    ) -> BcResult<RateLimitDecision> {
        let max = i64::from(max_attempts);

        if self.current_count(key).await? >= max {
            let retry_after = self.window_remaining(key, window).await?;
            return Ok(RateLimitDecision::denied(max_attempts, retry_after));
        }

        let count = self.store.increment(key).await?;
        if count == 1 {
            self.store.expire(key, window).await?;
        }

        if count > max {
            let retry_after = self.window_remaining(key, window).await?;
            return Ok(RateLimitDecision::denied(max_attempts, retry_after));
        }

        let remaining = u32::try_from(max - count).unwrap_or(0);
        Ok(RateLimitDecision::allowed(max_attempts, remaining))
    }

    async fn current_count(&self, key: &str) -> BcResult<i64> {
        match self.store.get(key).await? {
            None => Ok(0),
            Some(bytes) => std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .ok_or_else(|| {
                    BcError::Serialization(format!("Counter at '{}' is not an integer", key))
                }),
        }
    }

    /// Seconds left in the window. A counter that lost its expiry gets the
    /// full window again.
    async fn window_remaining(&self, key: &str, window: Duration) -> BcResult<u64> {
        match self.store.ttl(key).await? {
            KeyTtl::Expires(remaining) if !remaining.is_zero() => Ok(expiry_secs(remaining)),
            KeyTtl::Persistent => {
                self.store.expire(key, window).await?;
                Ok(expiry_secs(window))
            }
            _ => Ok(expiry_secs(window)),
        }
    }
}
