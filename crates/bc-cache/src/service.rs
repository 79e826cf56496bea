//! Cache-aside service.
//!
//! Every method here except [`CacheService::get_or_compute`] is
//! best-effort: store outages, timeouts and decode failures are logged and
//! reported as a miss (`None`) or a failed write (`false`), never as an
//! error. The cache is an optimization; callers always have another source
//! of truth.

use crate::keys::{KeyBuilder, Namespace};
use crate::metrics::CacheMetrics;
use crate::store::{ConnectionState, KeyValueStore};
use crate::ttl_policy::{clamp, TtlPolicy};
use bc_config::CacheConfig;
use bc_core::{BcError, BcResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A value returned by [`CacheService::get_or_compute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cached<T> {
    pub value: T,
    /// True when the value came from the store rather than the computation.
    pub from_cache: bool,
}

/// Delivery channel of a verification code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationChannel {
    Email,
    Sms,
}

impl VerificationChannel {
    const fn namespace(self) -> Namespace {
        match self {
            Self::Email => Namespace::VerifyEmail,
            Self::Sms => Namespace::VerifySms,
        }
    }
}

/// Snapshot reported by the cache status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub state: String,
    pub key_prefix: String,
    /// Keys under the prefix, when the store could be asked.
    pub keys: Option<usize>,
}

/// Cache and rate-limit facade over a [`KeyValueStore`].
///
/// Cheap to clone; all clones share the store.
#[derive(Clone)]
pub struct CacheService {
    pub(crate) store: Arc<dyn KeyValueStore>,
    pub(crate) keys: KeyBuilder,
    pub(crate) policy: TtlPolicy,
}

impl CacheService {
    /// Creates the service. The TTL table is read once here.
    pub fn new(store: Arc<dyn KeyValueStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            keys: KeyBuilder::new(config.key_prefix.clone()),
            policy: TtlPolicy::from_config(config),
        }
    }

    /// Key builder bound to the application prefix.
    #[must_use]
    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    /// TTL configured for `namespace`.
    #[must_use]
    pub fn ttl_for(&self, namespace: Namespace) -> Duration {
        self.policy.ttl_for(namespace)
    }

    /// Store connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.store.state()
    }

    /// Whether the store is ready to serve commands.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    // ==================== Generic operations ====================

    /// Reads and decodes the value under `key`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                CacheMetrics::miss();
                debug!(key, "Cache miss");
                return None;
            }
            Err(e) => {
                CacheMetrics::miss();
                degraded("get", key, &e);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                CacheMetrics::hit();
                debug!(key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                CacheMetrics::miss();
                CacheMetrics::error("decode");
                warn!(key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Encodes `value` and writes it with `ttl` (at least one second).
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.write(key, &bytes, ttl).await,
            Err(e) => {
                CacheMetrics::error("encode");
                warn!(key, error = %e, "Value could not be encoded for caching");
                false
            }
        }
    }

    /// [`set`](Self::set) with the configured default TTL.
    pub async fn set_default<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        self.set(key, value, self.policy.default_ttl()).await
    }

    /// Deletes `key`. True when the store accepted the command.
    pub async fn delete(&self, key: &str) -> bool {
        match self.store.delete(key).await {
            Ok(existed) => {
                debug!(key, existed, "Cache key deleted");
                true
            }
            Err(e) => {
                degraded("delete", key, &e);
                false
            }
        }
    }

    /// Deletes every key matching `pattern`. True when the store accepted
    /// the command.
    pub async fn delete_by_pattern(&self, pattern: &str) -> bool {
        match self.delete_matching(pattern).await {
            Ok(_) => true,
            Err(e) => {
                degraded("delete_by_pattern", pattern, &e);
                false
            }
        }
    }

    /// Deletes every key matching `pattern` and reports the count.
    ///
    /// Unlike the best-effort methods this surfaces store errors; the
    /// admin endpoint uses it.
    pub async fn delete_matching(&self, pattern: &str) -> BcResult<u64> {
        let removed = self.store.delete_by_pattern(pattern).await?;
        CacheMetrics::invalidated(removed);
        debug!(pattern, removed, "Cache pattern invalidated");
        Ok(removed)
    }

    /// Returns the cached value for `key`, or runs `compute` and caches
    /// its result.
    ///
    /// An error from `compute` is returned unchanged and nothing is
    /// stored. A result that serializes to JSON `null` is returned but not
    /// stored. Concurrent misses may each run `compute`; the last write
    /// wins.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<Cached<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get::<T>(key).await {
            return Ok(Cached {
                value,
                from_cache: true,
            });
        }

        let value = compute().await?;

        match serde_json::to_vec(&value) {
            Ok(bytes) if bytes.as_slice() == b"null" => {
                debug!(key, "Computed value is null, not caching");
            }
            Ok(bytes) => {
                self.write(key, &bytes, ttl).await;
            }
            Err(e) => {
                CacheMetrics::error("encode");
                warn!(key, error = %e, "Computed value could not be encoded for caching");
            }
        }

        Ok(Cached {
            value,
            from_cache: false,
        })
    }

    /// Reports the store state and, when reachable, the number of keys
    /// under the application prefix.
    pub async fn status(&self) -> CacheStatus {
        let pattern = format!("{}:*", self.keys.prefix());
        let keys = match self.store.enumerate_keys(&pattern).await {
            Ok(keys) => Some(keys.len()),
            Err(e) => {
                debug!(error = %e, "Key count unavailable");
                None
            }
        };

        CacheStatus {
            state: self.state().to_string(),
            key_prefix: self.keys.prefix().to_string(),
            keys,
        }
    }

    /// Closes the store connection.
    pub async fn shutdown(&self) {
        info!("Closing cache store");
        self.store.disconnect().await;
    }

    async fn write(&self, key: &str, bytes: &[u8], ttl: Duration) -> bool {
        let ttl = clamp(ttl);
        match self.store.set_with_expiry(key, bytes, ttl).await {
            Ok(()) => {
                CacheMetrics::write();
                debug!(key, ttl_secs = ttl.as_secs(), "Cached value");
                true
            }
            Err(e) => {
                degraded("set", key, &e);
                false
            }
        }
    }

    fn key_for(&self, namespace: Namespace, parts: &[&str]) -> String {
        self.keys.key(namespace, parts)
    }

    fn encoded_key<Q: Serialize + ?Sized>(
        &self,
        namespace: Namespace,
        identifier: &Q,
    ) -> Option<String> {
        match KeyBuilder::encode_identifier(identifier) {
            Ok(encoded) => Some(self.key_for(namespace, &[&encoded])),
            Err(e) => {
                CacheMetrics::error("encode");
                warn!(namespace = %namespace, error = %e, "Identifier could not be encoded");
                None
            }
        }
    }

    async fn put<T: Serialize + ?Sized>(&self, namespace: Namespace, key: &str, value: &T) -> bool {
        self.set(key, value, self.policy.ttl_for(namespace)).await
    }

    // ==================== Sessions ====================

    pub async fn cache_session<T: Serialize + ?Sized>(
        &self,
        session_id: impl Display,
        session: &T,
    ) -> bool {
        let key = self.key_for(Namespace::Session, &[&session_id.to_string()]);
        self.put(Namespace::Session, &key, session).await
    }

    pub async fn get_session<T: DeserializeOwned>(&self, session_id: impl Display) -> Option<T> {
        self.get(&self.key_for(Namespace::Session, &[&session_id.to_string()]))
            .await
    }

    pub async fn invalidate_session(&self, session_id: impl Display) -> bool {
        self.delete(&self.key_for(Namespace::Session, &[&session_id.to_string()]))
            .await
    }

    // ==================== User profiles ====================

    pub async fn cache_user_profile<T: Serialize + ?Sized>(
        &self,
        user_id: impl Display,
        profile: &T,
    ) -> bool {
        let key = self.key_for(Namespace::User, &[&user_id.to_string()]);
        self.put(Namespace::User, &key, profile).await
    }

    pub async fn get_user_profile<T: DeserializeOwned>(&self, user_id: impl Display) -> Option<T> {
        self.get(&self.key_for(Namespace::User, &[&user_id.to_string()]))
            .await
    }

    pub async fn invalidate_user_profile(&self, user_id: impl Display) -> bool {
        self.delete(&self.key_for(Namespace::User, &[&user_id.to_string()]))
            .await
    }

    // ==================== Stylist profiles and lists ====================

    pub async fn cache_stylist_profile<T: Serialize + ?Sized>(
        &self,
        stylist_id: impl Display,
        profile: &T,
    ) -> bool {
        let key = self.key_for(Namespace::Stylist, &[&stylist_id.to_string()]);
        self.put(Namespace::Stylist, &key, profile).await
    }

    pub async fn get_stylist_profile<T: DeserializeOwned>(
        &self,
        stylist_id: impl Display,
    ) -> Option<T> {
        self.get(&self.key_for(Namespace::Stylist, &[&stylist_id.to_string()]))
            .await
    }

    /// Drops the profile and every cached stylist list, since any list may
    /// embed the edited profile.
    pub async fn invalidate_stylist_profile(&self, stylist_id: impl Display) -> bool {
        let key = self.key_for(Namespace::Stylist, &[&stylist_id.to_string()]);
        let (profile, lists) = futures::join!(self.delete(&key), self.invalidate_stylist_lists());
        profile && lists
    }

    /// Caches a stylist list under a key derived from its filter object.
    pub async fn cache_stylist_list<F, T>(&self, filters: &F, list: &T) -> bool
    where
        F: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        match self.encoded_key(Namespace::Stylists, filters) {
            Some(key) => self.put(Namespace::Stylists, &key, list).await,
            None => false,
        }
    }

    pub async fn get_stylist_list<F, T>(&self, filters: &F) -> Option<T>
    where
        F: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let key = self.encoded_key(Namespace::Stylists, filters)?;
        self.get(&key).await
    }

    pub async fn invalidate_stylist_lists(&self) -> bool {
        self.delete_by_pattern(&self.keys.namespace_pattern(Namespace::Stylists))
            .await
    }

    // ==================== Services ====================

    pub async fn cache_services<T: Serialize + ?Sized>(
        &self,
        stylist_id: impl Display,
        services: &T,
    ) -> bool {
        let key = self.key_for(Namespace::Services, &[&stylist_id.to_string()]);
        self.put(Namespace::Services, &key, services).await
    }

    pub async fn get_services<T: DeserializeOwned>(&self, stylist_id: impl Display) -> Option<T> {
        self.get(&self.key_for(Namespace::Services, &[&stylist_id.to_string()]))
            .await
    }

    pub async fn invalidate_services(&self, stylist_id: impl Display) -> bool {
        self.delete(&self.key_for(Namespace::Services, &[&stylist_id.to_string()]))
            .await
    }

    // ==================== Availability ====================

    pub async fn cache_availability<T: Serialize + ?Sized>(
        &self,
        stylist_id: impl Display,
        date: impl Display,
        slots: &T,
    ) -> bool {
        let key = self.key_for(
            Namespace::Availability,
            &[&stylist_id.to_string(), &date.to_string()],
        );
        self.put(Namespace::Availability, &key, slots).await
    }

    pub async fn get_availability<T: DeserializeOwned>(
        &self,
        stylist_id: impl Display,
        date: impl Display,
    ) -> Option<T> {
        let key = self.key_for(
            Namespace::Availability,
            &[&stylist_id.to_string(), &date.to_string()],
        );
        self.get(&key).await
    }

    pub async fn invalidate_availability(
        &self,
        stylist_id: impl Display,
        date: impl Display,
    ) -> bool {
        let key = self.key_for(
            Namespace::Availability,
            &[&stylist_id.to_string(), &date.to_string()],
        );
        self.delete(&key).await
    }

    /// Drops availability for every date of one stylist.
    pub async fn invalidate_stylist_availability(&self, stylist_id: impl Display) -> bool {
        let pattern = self
            .keys
            .prefix_pattern(Namespace::Availability, [stylist_id.to_string()]);
        self.delete_by_pattern(&pattern).await
    }

    // ==================== Search ====================

    pub async fn cache_search_results<Q, T>(&self, query: &Q, results: &T) -> bool
    where
        Q: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        match self.encoded_key(Namespace::Search, query) {
            Some(key) => self.put(Namespace::Search, &key, results).await,
            None => false,
        }
    }

    pub async fn get_search_results<Q, T>(&self, query: &Q) -> Option<T>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let key = self.encoded_key(Namespace::Search, query)?;
        self.get(&key).await
    }

    pub async fn invalidate_search_results(&self) -> bool {
        self.delete_by_pattern(&self.keys.namespace_pattern(Namespace::Search))
            .await
    }

    // ==================== Verification codes ====================

    pub async fn cache_verification_code<T: Serialize + ?Sized>(
        &self,
        identifier: &str,
        channel: VerificationChannel,
        code: &T,
    ) -> bool {
        let namespace = channel.namespace();
        let key = self.key_for(namespace, &[identifier]);
        self.put(namespace, &key, code).await
    }

    pub async fn get_verification_code<T: DeserializeOwned>(
        &self,
        identifier: &str,
        channel: VerificationChannel,
    ) -> Option<T> {
        self.get(&self.key_for(channel.namespace(), &[identifier]))
            .await
    }

    pub async fn invalidate_verification_code(
        &self,
        identifier: &str,
        channel: VerificationChannel,
    ) -> bool {
        self.delete(&self.key_for(channel.namespace(), &[identifier]))
            .await
    }

    // ==================== Stats ====================

    pub async fn cache_stats<T: Serialize + ?Sized>(&self, scope: impl Display, stats: &T) -> bool {
        let key = self.key_for(Namespace::Stats, &[&scope.to_string()]);
        self.put(Namespace::Stats, &key, stats).await
    }

    pub async fn get_stats<T: DeserializeOwned>(&self, scope: impl Display) -> Option<T> {
        self.get(&self.key_for(Namespace::Stats, &[&scope.to_string()]))
            .await
    }

    pub async fn invalidate_stats(&self, scope: impl Display) -> bool {
        self.delete(&self.key_for(Namespace::Stats, &[&scope.to_string()]))
            .await
    }
}

/// Logs a recovered store failure.
fn degraded(operation: &'static str, key: &str, err: &BcError) {
    CacheMetrics::error(operation);
    if err.is_store_failure() {
        debug!(operation, key, error = %err, "Cache degraded");
    } else {
        warn!(operation, key, error = %err, "Cache operation failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, MockKeyValueStore};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn service_with(store: Arc<dyn KeyValueStore>) -> CacheService {
        CacheService::new(store, &CacheConfig::default())
    }

    fn memory_service() -> (CacheService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (service_with(store.clone()), store)
    }

    fn outage_store() -> MockKeyValueStore {
        let mut store = MockKeyValueStore::new();
        store
            .expect_state()
            .return_const(ConnectionState::Disconnected);
        store
            .expect_get()
            .returning(|_| Err(BcError::unavailable("down")));
        store
            .expect_set_with_expiry()
            .returning(|_, _, _| Err(BcError::unavailable("down")));
        store
            .expect_delete()
            .returning(|_| Err(BcError::Timeout("DEL timed out".to_string())));
        store
            .expect_delete_by_pattern()
            .returning(|_| Err(BcError::unavailable("down")));
        store
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_get_until_expiry() {
        let (cache, _) = memory_service();
        assert!(cache.set("bc:user:42", &json!({"name": "Ana"}), Duration::from_secs(5)).await);

        let value: Option<Value> = cache.get("bc:user:42").await;
        assert_eq!(value, Some(json!({"name": "Ana"})));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cache.get::<Value>("bc:user:42").await.is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get::<Value>("bc:user:42").await.is_none());
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let (cache, store) = memory_service();
        store
            .set_with_expiry("bc:user:1", b"not json", Duration::from_secs(10))
            .await
            .unwrap();

        let value: Option<Value> = cache.get("bc:user:1").await;
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_type_mismatch_is_a_miss() {
        let (cache, _) = memory_service();
        cache.set_default("bc:stats:global", &json!({"a": 1})).await;
        let value: Option<Vec<u32>> = cache.get("bc:stats:global").await;
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_writes_always_carry_ttl() {
        let (cache, store) = memory_service();
        cache.set("bc:k", &1, Duration::ZERO).await;
        cache.set_default("bc:d", &1).await;
        cache.cache_user_profile(1, &json!({})).await;

        for key in store.enumerate_keys("bc:*").await.unwrap() {
            assert!(matches!(
                store.ttl(&key).await.unwrap(),
                crate::KeyTtl::Expires(_)
            ));
        }
    }

    #[tokio::test]
    async fn test_get_or_compute_runs_once() {
        let (cache, _) = memory_service();
        let calls = AtomicU32::new(0);

        for expected_from_cache in [false, true, true] {
            let result = cache
                .get_or_compute("bc:stats:daily", Duration::from_secs(60), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(json!({"bookings": 3}))
                })
                .await
                .unwrap();
            assert_eq!(result.value, json!({"bookings": 3}));
            assert_eq!(result.from_cache, expected_from_cache);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_compute_propagates_error() {
        let (cache, store) = memory_service();
        let result: Result<Cached<Value>, &str> = cache
            .get_or_compute("bc:stats:x", Duration::from_secs(60), || async { Err("db down") })
            .await;

        assert_eq!(result.unwrap_err(), "db down");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_get_or_compute_skips_null() {
        let (cache, store) = memory_service();
        let result = cache
            .get_or_compute("bc:user:9", Duration::from_secs(60), || async {
                Ok::<Option<Value>, String>(None)
            })
            .await
            .unwrap();

        assert_eq!(result.value, None);
        assert!(!result.from_cache);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_get_or_compute_during_outage_still_computes() {
        let cache = service_with(Arc::new(outage_store()));
        let result = cache
            .get_or_compute("bc:user:1", Duration::from_secs(60), || async {
                Ok::<_, String>(7u32)
            })
            .await
            .unwrap();
        assert_eq!(result, Cached { value: 7, from_cache: false });
    }

    #[tokio::test]
    async fn test_outage_degrades_to_miss() {
        let cache = service_with(Arc::new(outage_store()));

        assert!(!cache.is_available());
        assert!(cache.get::<Value>("bc:user:1").await.is_none());
        assert!(!cache.set("bc:user:1", &json!({}), Duration::from_secs(5)).await);
        assert!(!cache.delete("bc:user:1").await);
        assert!(!cache.delete_by_pattern("bc:stylists:*").await);
        assert!(!cache.invalidate_stylist_profile(3).await);
    }

    #[tokio::test]
    async fn test_stylist_invalidation_clears_lists() {
        let (cache, _) = memory_service();
        let by_city = json!({"city": "Porto"});
        let by_rating = json!({"minRating": 4, "page": 2});

        cache.cache_stylist_profile(7, &json!({"id": 7})).await;
        cache.cache_stylist_list(&by_city, &json!([1, 2])).await;
        cache.cache_stylist_list(&by_rating, &json!([7])).await;
        assert!(cache.get_stylist_list::<_, Value>(&by_city).await.is_some());

        assert!(cache.invalidate_stylist_profile(7).await);

        assert!(cache.get_stylist_profile::<Value>(7).await.is_none());
        assert!(cache.get_stylist_list::<_, Value>(&by_city).await.is_none());
        assert!(cache.get_stylist_list::<_, Value>(&by_rating).await.is_none());
    }

    #[tokio::test]
    async fn test_domain_helpers_use_namespaced_keys() {
        let (cache, store) = memory_service();

        cache.cache_user_profile(42, &json!({"name": "Ana"})).await;
        cache.cache_services(7, &json!([])).await;
        cache.cache_availability(7, "2024-05-01", &json!(["09:00"])).await;
        cache
            .cache_verification_code("ana@example.com", VerificationChannel::Email, &"123456")
            .await;
        cache.cache_session("s-1", &json!({"userId": 42})).await;

        assert!(store.exists("bc:user:42").await.unwrap());
        assert!(store.exists("bc:services:7").await.unwrap());
        assert!(store.exists("bc:availability:7:2024-05-01").await.unwrap());
        assert!(store.exists("bc:verify:email:ana@example.com").await.unwrap());
        assert!(store.exists("bc:session:s-1").await.unwrap());

        let code: Option<String> = cache
            .get_verification_code("ana@example.com", VerificationChannel::Email)
            .await;
        assert_eq!(code.as_deref(), Some("123456"));
        assert!(cache
            .get_verification_code::<String>("ana@example.com", VerificationChannel::Sms)
            .await
            .is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_domain_ttls() {
        let (cache, store) = memory_service();
        cache.cache_availability(7, "2024-05-01", &json!([])).await;
        cache.cache_user_profile(1, &json!({})).await;

        assert_eq!(
            store.ttl("bc:availability:7:2024-05-01").await.unwrap(),
            crate::KeyTtl::Expires(Duration::from_secs(300))
        );
        assert_eq!(
            store.ttl("bc:user:1").await.unwrap(),
            crate::KeyTtl::Expires(Duration::from_secs(1800))
        );
    }

    #[tokio::test]
    async fn test_invalidate_stylist_availability() {
        let (cache, _) = memory_service();
        cache.cache_availability(7, "2024-05-01", &json!([])).await;
        cache.cache_availability(7, "2024-05-02", &json!([])).await;
        cache.cache_availability(8, "2024-05-01", &json!([])).await;

        assert!(cache.invalidate_stylist_availability(7).await);

        assert!(cache.get_availability::<Value>(7, "2024-05-01").await.is_none());
        assert!(cache.get_availability::<Value>(7, "2024-05-02").await.is_none());
        assert!(cache.get_availability::<Value>(8, "2024-05-01").await.is_some());
    }

    #[tokio::test]
    async fn test_search_results_keyed_by_query() {
        let (cache, _) = memory_service();
        cache
            .cache_search_results(&json!({"q": "balayage", "city": "Lisboa"}), &json!([1]))
            .await;

        let hit: Option<Value> = cache
            .get_search_results(&json!({"q": "balayage", "city": "Lisboa"}))
            .await;
        let miss: Option<Value> = cache.get_search_results(&json!({"q": "fade"})).await;
        assert_eq!(hit, Some(json!([1])));
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_status_and_delete_matching() {
        let (cache, _) = memory_service();
        cache.cache_stats("global", &json!({})).await;
        cache.cache_user_profile(1, &json!({})).await;

        let status = cache.status().await;
        assert_eq!(status.state, "ready");
        assert_eq!(status.keys, Some(2));

        assert_eq!(cache.delete_matching("bc:user:*").await.unwrap(), 1);
        assert_eq!(cache.status().await.keys, Some(1));
    }

    #[tokio::test]
    async fn test_shutdown_disconnects() {
        let (cache, store) = memory_service();
        cache.shutdown().await;
        assert_eq!(store.state(), ConnectionState::Disconnected);
        assert!(cache.status().await.keys.is_none());
    }
}
