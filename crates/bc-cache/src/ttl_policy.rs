//! Per-namespace TTL table, fixed at construction.

use crate::Namespace;
use bc_config::{CacheConfig, TtlTable};
use std::time::Duration;

/// Window used when a rate-limit TTL is needed but none was supplied.
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Maps each namespace to its TTL.
///
/// A zero entry is raised to one second so that no write ever produces a
/// permanent key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    default: Duration,
    table: TtlTable,
}

impl TtlPolicy {
    /// Reads the table out of the cache configuration.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            default: config.default_ttl(),
            table: config.ttl.clone(),
        }
    }

    /// TTL applied when the caller names none.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        clamp(self.default)
    }

    /// TTL for `namespace`.
    #[must_use]
    pub fn ttl_for(&self, namespace: Namespace) -> Duration {
        let secs = match namespace {
            Namespace::Session => self.table.session,
            Namespace::User => self.table.user,
            Namespace::Stylist => self.table.stylist,
            Namespace::Stylists => self.table.stylists,
            Namespace::Services => self.table.services,
            Namespace::Availability => self.table.availability,
            Namespace::Search => self.table.search,
            Namespace::VerifyEmail | Namespace::VerifySms => self.table.verification,
            Namespace::Stats => self.table.stats,
            Namespace::Route => self.table.route,
            Namespace::RateLimit => return DEFAULT_RATE_LIMIT_WINDOW,
        };
        clamp(Duration::from_secs(secs))
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// Raises sub-second durations to one second.
pub(crate) fn clamp(ttl: Duration) -> Duration {
    ttl.max(Duration::from_secs(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.ttl_for(Namespace::Session), Duration::from_secs(3600));
        assert_eq!(policy.ttl_for(Namespace::User), Duration::from_secs(1800));
        assert_eq!(policy.ttl_for(Namespace::Stylists), Duration::from_secs(600));
        assert_eq!(policy.ttl_for(Namespace::Availability), Duration::from_secs(300));
        assert_eq!(policy.ttl_for(Namespace::VerifySms), Duration::from_secs(600));
        assert_eq!(policy.ttl_for(Namespace::RateLimit), Duration::from_secs(60));
        assert_eq!(policy.default_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_overrides_from_config() {
        let mut config = CacheConfig::default();
        config.ttl.search = 42;
        config.default_ttl_secs = 10;
        let policy = TtlPolicy::from_config(&config);
        assert_eq!(policy.ttl_for(Namespace::Search), Duration::from_secs(42));
        assert_eq!(policy.default_ttl(), Duration::from_secs(10));
    }

    #[test]
    fn test_never_zero() {
        let mut config = CacheConfig::default();
        config.ttl.stats = 0;
        config.default_ttl_secs = 0;
        let policy = TtlPolicy::from_config(&config);
        for namespace in Namespace::ALL {
            assert!(policy.ttl_for(namespace) >= Duration::from_secs(1));
        }
        assert_eq!(policy.default_ttl(), Duration::from_secs(1));
    }
}
