//! Redis test container shared by the integration tests.

use bc_cache::RedisStore;
use bc_config::RedisConfig;
use testcontainers::{runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::redis::{Redis, REDIS_PORT};

/// A running Redis container and a connected store.
pub struct TestRedis {
    _container: ContainerAsync<Redis>,
    config: RedisConfig,
    store: RedisStore,
}

impl TestRedis {
    /// Starts a fresh Redis container and connects to it.
    pub async fn new() -> Self {
        let container = Redis::default()
            .start()
            .await
            .expect("Failed to start Redis container");

        let port = container
            .get_host_port_ipv4(REDIS_PORT)
            .await
            .expect("Failed to get Redis port");

        let config = RedisConfig {
            host: "127.0.0.1".to_string(),
            port,
            pool_size: 4,
            reconnect_max_attempts: 20,
            reconnect_initial_delay_ms: 100,
            ..Default::default()
        };

        let store = RedisStore::connect(&config)
            .await
            .expect("Failed to connect to Redis");

        Self {
            _container: container,
            config,
            store,
        }
    }

    pub fn store(&self) -> RedisStore {
        self.store.clone()
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }
}
