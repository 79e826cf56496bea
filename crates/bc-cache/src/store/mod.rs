//! Key-value store adapters.
//!
//! [`KeyValueStore`] is the minimal operation set the cache layer needs
//! from its backing store. Every operation fails fast with
//! [`BcError::StoreUnavailable`](bc_core::BcError::StoreUnavailable) while
//! the store is not [`ConnectionState::Ready`]; nothing is queued.

mod memory_store;
mod redis_store;

pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use bc_core::BcResult;
use regex::Regex;
use std::fmt;
use std::time::Duration;

/// Connection lifecycle of a store.
///
/// `Disconnected -> Connecting -> Ready`, and back to `Disconnected` when a
/// command hits a connection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Ready = 2,
}

impl ConnectionState {
    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            2 => Self::Ready,
            1 => Self::Connecting,
            _ => Self::Disconnected,
        }
    }

    /// Lowercase name used in logs and the status endpoint.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists without an expiry.
    Persistent,
    /// The key expires after this long.
    Expires(Duration),
}

impl KeyTtl {
    /// Interprets a Redis `TTL` reply (`-2` missing, `-1` no expiry).
    #[must_use]
    pub fn from_redis_seconds(seconds: i64) -> Self {
        match seconds {
            -2 => Self::Missing,
            s if s < 0 => Self::Persistent,
            s => Self::Expires(Duration::from_secs(s as u64)),
        }
    }
}

/// Operations the cache layer issues against its backing store.
///
/// Implementations must be safe to share across concurrent request
/// handlers without caller-side locking.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Reads the raw bytes stored under `key`.
    async fn get(&self, key: &str) -> BcResult<Option<Vec<u8>>>;

    /// Writes `value` under `key`, expiring after `ttl` (at least one second).
    async fn set_with_expiry(&self, key: &str, value: &[u8], ttl: Duration) -> BcResult<()>;

    /// Deletes `key`. Returns whether it existed.
    async fn delete(&self, key: &str) -> BcResult<bool>;

    /// Deletes every key matching the glob `pattern`. Returns the count removed.
    async fn delete_by_pattern(&self, pattern: &str) -> BcResult<u64>;

    /// Whether `key` exists.
    async fn exists(&self, key: &str) -> BcResult<bool>;

    /// Increments the integer under `key`, creating it at 1 when absent.
    ///
    /// Creation does not set an expiry; an existing expiry is kept.
    async fn increment(&self, key: &str) -> BcResult<i64>;

    /// Sets the expiry of an existing key. Returns false when the key is missing.
    async fn expire(&self, key: &str, ttl: Duration) -> BcResult<bool>;

    /// Remaining lifetime of `key`.
    async fn ttl(&self, key: &str) -> BcResult<KeyTtl>;

    /// Lists keys matching the glob `pattern` without blocking the store.
    async fn enumerate_keys(&self, pattern: &str) -> BcResult<Vec<String>>;

    /// Closes the connection. Later operations fail as unavailable.
    async fn disconnect(&self);
}

/// Whole seconds for a store expiry, never zero.
pub(crate) fn expiry_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

/// Translates a Redis-style glob into an anchored regex.
///
/// Supports `*`, `?`, `[...]` classes (with `^` negation) and `\` escapes.
pub(crate) fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut out = String::from("(?s)^");
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push_str(&regex::escape(&next.to_string()));
                }
            }
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                if chars.peek() == Some(&'^') {
                    chars.next();
                    class.push('^');
                }
                while let Some(c) = chars.next() {
                    match c {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '\\' => {
                            if let Some(next) = chars.next() {
                                class.push('\\');
                                class.push(next);
                            }
                        }
                        '[' | '&' | '~' => {
                            class.push('\\');
                            class.push(c);
                        }
                        _ => class.push(c),
                    }
                }
                if closed && !class.is_empty() && class != "^" {
                    out.push('[');
                    out.push_str(&class);
                    out.push(']');
                } else {
                    out.push_str(&regex::escape("["));
                    out.push_str(&regex::escape(&class));
                    if closed {
                        out.push_str(&regex::escape("]"));
                    }
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    Regex::new(&out)
}
