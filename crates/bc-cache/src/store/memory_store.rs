//! In-process store.
//!
//! Used when Redis is disabled and as the backing store in tests. Expiry
//! is evaluated on access against `tokio::time::Instant`, so paused test
//! clocks drive it. Writes also sweep every expired entry once per
//! [`SWEEP_INTERVAL`], so keys that are never read again do not pile up.

use super::{glob_to_regex, ConnectionState, KeyTtl, KeyValueStore};
use crate::metrics::CacheMetrics;
use async_trait::async_trait;
use bc_core::{BcError, BcResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Minimum time between two full sweeps of expired entries.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// `HashMap`-backed [`KeyValueStore`].
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    last_sweep: Mutex<Instant>,
    state: AtomicU8,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store in the `Ready` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            last_sweep: Mutex::new(Instant::now()),
            state: AtomicU8::new(ConnectionState::Ready as u8),
        }
    }

    /// Forces the connection state. Anything but `Ready` makes every
    /// operation fail as unavailable, which is how outages are simulated.
    pub fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
        CacheMetrics::store_state(state);
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|e| !e.is_expired(now)).count()
    }

    /// Entries held in the map, expired or not.
    #[cfg(test)]
    fn held(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store holds no live keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_ready(&self, operation: &str) -> BcResult<()> {
        match self.state() {
            ConnectionState::Ready => Ok(()),
            state => Err(BcError::unavailable(format!(
                "{} rejected: store is {}",
                operation, state
            ))),
        }
    }

    /// Drops every expired entry if the last sweep is older than
    /// [`SWEEP_INTERVAL`]. Called with the entries lock held, by the
    /// operations that add keys.
    fn sweep_if_due(&self, entries: &mut HashMap<String, Entry>, now: Instant) {
        let mut last_sweep = self.last_sweep.lock();
        if now.saturating_duration_since(*last_sweep) < SWEEP_INTERVAL {
            return;
        }
        *last_sweep = now;

        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let swept = before - entries.len();
        if swept > 0 {
            debug!(swept, remaining = entries.len(), "Swept expired entries");
        }
    }

    fn matching_keys(&self, pattern: &str) -> BcResult<Vec<String>> {
        let regex = glob_to_regex(pattern)
            .map_err(|e| BcError::validation(format!("Invalid key pattern '{}': {}", pattern, e)))?;
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| !entry.is_expired(now));
        let mut keys: Vec<String> = entries.keys().filter(|k| regex.is_match(k)).cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// Looks up a live entry, dropping it first if it has expired.
fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let now = Instant::now();
    if entries.get(key).is_some_and(|e| e.is_expired(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    async fn get(&self, key: &str) -> BcResult<Option<Vec<u8>>> {
        self.ensure_ready("GET")?;
        let mut entries = self.entries.lock();
        Ok(live(&mut entries, key).map(|e| e.value.clone()))
    }

    async fn set_with_expiry(&self, key: &str, value: &[u8], ttl: Duration) -> BcResult<()> {
        self.ensure_ready("SETEX")?;
        let ttl = ttl.max(Duration::from_secs(1));
        let now = Instant::now();
        let mut entries = self.entries.lock();
        self.sweep_if_due(&mut entries, now);
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> BcResult<bool> {
        self.ensure_ready("DEL")?;
        let mut entries = self.entries.lock();
        let existed = live(&mut entries, key).is_some();
        entries.remove(key);
        Ok(existed)
    }

    async fn delete_by_pattern(&self, pattern: &str) -> BcResult<u64> {
        self.ensure_ready("DEL")?;
        let keys = self.matching_keys(pattern)?;
        let mut entries = self.entries.lock();
        let removed = keys.iter().filter(|k| entries.remove(k.as_str()).is_some()).count();
        Ok(removed as u64)
    }

    async fn exists(&self, key: &str) -> BcResult<bool> {
        self.ensure_ready("EXISTS")?;
        let mut entries = self.entries.lock();
        Ok(live(&mut entries, key).is_some())
    }

    async fn increment(&self, key: &str) -> BcResult<i64> {
        self.ensure_ready("INCR")?;
        let mut entries = self.entries.lock();
        self.sweep_if_due(&mut entries, Instant::now());

        match live(&mut entries, key) {
            Some(entry) => {
                let current: i64 = std::str::from_utf8(&entry.value)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| {
                        BcError::internal(format!("Value at '{}' is not an integer", key))
                    })?;
                let next = current.checked_add(1).ok_or_else(|| {
                    BcError::internal(format!("Increment of '{}' would overflow", key))
                })?;
                entry.value = next.to_string().into_bytes();
                Ok(next)
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: b"1".to_vec(),
                        expires_at: None,
                    },
                );
                Ok(1)
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> BcResult<bool> {
        self.ensure_ready("EXPIRE")?;
        let mut entries = self.entries.lock();
        match live(&mut entries, key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl.max(Duration::from_secs(1)));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> BcResult<KeyTtl> {
        self.ensure_ready("TTL")?;
        let mut entries = self.entries.lock();
        Ok(match live(&mut entries, key) {
            None => KeyTtl::Missing,
            Some(Entry { expires_at: None, .. }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(at), ..
            }) => KeyTtl::Expires(at.saturating_duration_since(Instant::now())),
        })
    }

    async fn enumerate_keys(&self, pattern: &str) -> BcResult<Vec<String>> {
        self.ensure_ready("SCAN")?;
        self.matching_keys(pattern)
    }

    async fn disconnect(&self) {
        self.set_state(ConnectionState::Disconnected);
    }
}
