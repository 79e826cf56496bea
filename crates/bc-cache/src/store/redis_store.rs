//! Redis adapter.

use super::{expiry_secs, ConnectionState, KeyTtl, KeyValueStore};
use crate::metrics::CacheMetrics;
use async_trait::async_trait;
use bc_config::RedisConfig;
use bc_core::{BcError, BcResult};
use bc_resilience::{with_timeout, ReconnectPolicy};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::{AsyncCommands, RedisError, RedisResult};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Keys requested per `SCAN` round trip.
const SCAN_BATCH: usize = 200;

/// Keys per `DEL` when deleting by pattern.
const DELETE_CHUNK: usize = 500;

struct Inner {
    pool: Pool,
    state: AtomicU8,
    reconnecting: AtomicBool,
    closed: AtomicBool,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    command_timeout: Duration,
}

/// [`KeyValueStore`] over a pooled Redis connection.
///
/// Cloning is cheap and shares the pool and connection state.
///
/// A command that fails at the connection level moves the store to
/// `Disconnected` and starts a background reconnect. Commands issued
/// while not `Ready` fail immediately; once a reconnect cycle exhausts
/// its attempts, the next command starts a new one.
#[derive(Clone)]
pub struct RedisStore {
    inner: Arc<Inner>,
}

impl RedisStore {
    /// Builds the pool without connecting.
    pub fn new(config: &RedisConfig) -> BcResult<Self> {
        let url = config.connection_url();
        let connect_timeout = config.connect_timeout();

        let pool = Config::from_url(url)
            .builder()
            .map_err(|e| BcError::Configuration(format!("Invalid Redis config: {}", e)))?
            .max_size(config.pool_size)
            .runtime(Runtime::Tokio1)
            .wait_timeout(Some(connect_timeout))
            .create_timeout(Some(connect_timeout))
            .recycle_timeout(Some(connect_timeout))
            .build()
            .map_err(|e| BcError::Configuration(format!("Failed to create Redis pool: {}", e)))?;

        Ok(Self {
            inner: Arc::new(Inner {
                pool,
                state: AtomicU8::new(ConnectionState::Disconnected as u8),
                reconnecting: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                policy: ReconnectPolicy::new(
                    config.reconnect_max_attempts,
                    config.reconnect_initial_delay(),
                    config.reconnect_max_delay(),
                ),
                connect_timeout,
                command_timeout: config.command_timeout(),
            }),
        })
    }

    /// Builds the pool and connects, retrying per the reconnect policy.
    ///
    /// Startup code that should run degraded when Redis is down uses
    /// [`RedisStore::new`] followed by [`RedisStore::establish`] instead.
    pub async fn connect(config: &RedisConfig) -> BcResult<Self> {
        let store = Self::new(config)?;
        store.establish().await?;
        Ok(store)
    }

    /// Runs one reconnect cycle in the foreground.
    pub async fn establish(&self) -> BcResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(BcError::unavailable("store has been closed"));
        }

        self.set_state(ConnectionState::Connecting);
        info!("Connecting to Redis...");

        let inner = self.inner.clone();
        let result = self
            .inner
            .policy
            .execute(move |attempt| {
                let inner = inner.clone();
                async move {
                    debug!(attempt, "Pinging Redis");
                    with_timeout(inner.connect_timeout, "PING", async {
                        let mut conn = inner
                            .pool
                            .get()
                            .await
                            .map_err(|e| BcError::unavailable(e.to_string()))?;
                        redis::cmd("PING")
                            .query_async::<String>(&mut *conn)
                            .await
                            .map_err(classify)
                    })
                    .await
                }
            })
            .await;

        if self.inner.closed.load(Ordering::SeqCst) {
            self.set_state(ConnectionState::Disconnected);
            return Err(BcError::unavailable("store closed while connecting"));
        }

        match result {
            Ok(_) => {
                self.set_state(ConnectionState::Ready);
                info!("Redis connection ready");
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                error!(
                    attempts = self.inner.policy.max_attempts,
                    error = %e,
                    "Giving up on Redis connection"
                );
                Err(BcError::unavailable(format!(
                    "Redis unreachable after {} attempts: {}",
                    self.inner.policy.max_attempts, e
                )))
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous =
            ConnectionState::from_u8(self.inner.state.swap(state as u8, Ordering::SeqCst));
        if previous != state {
            debug!(from = %previous, to = %state, "Redis connection state changed");
            CacheMetrics::store_state(state);
        }
    }

    /// Starts a background reconnect unless one is already running.
    fn spawn_reconnect(&self) {
        if self.inner.closed.load(Ordering::SeqCst) {
            return;
        }
        if self
            .inner
            .reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let store = self.clone();
        tokio::spawn(async move {
            let _ = store.establish().await;
            store.inner.reconnecting.store(false, Ordering::SeqCst);
        });
    }

    fn ensure_ready(&self, operation: &str) -> BcResult<()> {
        match self.state() {
            ConnectionState::Ready => Ok(()),
            state => {
                if state == ConnectionState::Disconnected {
                    self.spawn_reconnect();
                }
                Err(BcError::unavailable(format!(
                    "{} rejected: store is {}",
                    operation, state
                )))
            }
        }
    }

    /// Runs one command on a pooled connection under the command timeout.
    async fn command<T, F, Fut>(&self, operation: &'static str, f: F) -> BcResult<T>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        self.ensure_ready(operation)?;

        let result = with_timeout(self.inner.command_timeout, operation, async {
            let conn = self
                .inner
                .pool
                .get()
                .await
                .map_err(|e| BcError::unavailable(format!("No Redis connection: {}", e)))?;
            f(conn).await.map_err(classify)
        })
        .await;

        if let Err(e) = &result {
            if e.is_store_failure() {
                warn!(operation, error = %e, "Redis command failed, reconnecting");
                self.set_state(ConnectionState::Disconnected);
                self.spawn_reconnect();
            }
        }

        result
    }
}

/// Connection-level failures become `StoreUnavailable`; anything else
/// (a reply error such as `INCR` on a non-integer) is `Internal`.
fn classify(err: RedisError) -> BcError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
    {
        BcError::unavailable(err.to_string())
    } else {
        BcError::internal(format!("Redis error: {}", err))
    }
}

async fn scan(conn: &mut Connection, pattern: &str) -> RedisResult<Vec<String>> {
    let mut cursor: u64 = 0;
    let mut keys = Vec::new();

    loop {
        let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(SCAN_BATCH)
            .query_async(conn)
            .await?;
        keys.extend(batch);
        if next == 0 {
            break;
        }
        cursor = next;
    }

    // SCAN may return a key more than once.
    keys.sort();
    keys.dedup();
    Ok(keys)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    async fn get(&self, key: &str) -> BcResult<Option<Vec<u8>>> {
        self.command("GET", |mut conn| async move { conn.get(key).await })
            .await
    }

    async fn set_with_expiry(&self, key: &str, value: &[u8], ttl: Duration) -> BcResult<()> {
        let secs = expiry_secs(ttl);
        self.command("SETEX", |mut conn| async move {
            conn.set_ex::<_, _, ()>(key, value, secs).await
        })
        .await
    }

    async fn delete(&self, key: &str) -> BcResult<bool> {
        let removed: i64 = self
            .command("DEL", |mut conn| async move { conn.del(key).await })
            .await?;
        Ok(removed > 0)
    }

    async fn delete_by_pattern(&self, pattern: &str) -> BcResult<u64> {
        let removed = self
            .command("DEL", |mut conn| async move {
                let keys = scan(&mut conn, pattern).await?;
                let mut removed: u64 = 0;
                for chunk in keys.chunks(DELETE_CHUNK) {
                    let count: u64 = conn.del(chunk).await?;
                    removed += count;
                }
                Ok::<_, RedisError>(removed)
            })
            .await?;
        debug!(pattern, removed, "Deleted keys by pattern");
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> BcResult<bool> {
        self.command("EXISTS", |mut conn| async move { conn.exists(key).await })
            .await
    }

    async fn increment(&self, key: &str) -> BcResult<i64> {
        self.command("INCR", |mut conn| async move { conn.incr(key, 1).await })
            .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> BcResult<bool> {
        let secs = expiry_secs(ttl) as i64;
        self.command("EXPIRE", |mut conn| async move { conn.expire(key, secs).await })
            .await
    }

    async fn ttl(&self, key: &str) -> BcResult<KeyTtl> {
        let seconds: i64 = self
            .command("TTL", |mut conn| async move { conn.ttl(key).await })
            .await?;
        Ok(KeyTtl::from_redis_seconds(seconds))
    }

    async fn enumerate_keys(&self, pattern: &str) -> BcResult<Vec<String>> {
        self.command("SCAN", |mut conn| async move { scan(&mut conn, pattern).await })
            .await
    }

    async fn disconnect(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.pool.close();
        self.set_state(ConnectionState::Disconnected);
        info!("Redis connection closed");
    }
}
