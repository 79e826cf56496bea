//! Application configuration structures.

use bc_core::{LogFormat, TelemetryConfig};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Remote key-value store connection.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Cache key prefix and TTL table.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Request quotas.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (development, staging, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "bc-edge".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Enable CORS.
    pub cors_enabled: bool,
    /// CORS allowed origins.
    pub cors_origins: Vec<String>,
    /// Peer addresses of reverse proxies whose `X-Forwarded-For` is
    /// believed. Empty means the socket peer is always the client.
    pub trusted_proxies: Vec<String>,
    /// Bearer token for the cache admin endpoints. They are not mounted
    /// while this is unset.
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
            trusted_proxies: Vec::new(),
            admin_token: None,
        }
    }
}

impl ServerConfig {
    /// Returns the bind address.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the request timeout as a Duration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parsed `trusted_proxies`. Entries that are not IP addresses are
    /// skipped; validation reports them.
    #[must_use]
    pub fn trusted_proxy_addrs(&self) -> Vec<IpAddr> {
        self.trusted_proxies
            .iter()
            .filter_map(|addr| addr.trim().parse().ok())
            .collect()
    }

    /// The admin token, ignoring a blank value.
    #[must_use]
    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

/// Redis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Use Redis. When disabled the in-process store is used instead.
    pub enabled: bool,
    /// Full connection URL. Overrides host/port/password/database when set.
    pub url: Option<String>,
    /// Redis host.
    pub host: String,
    /// Redis port.
    pub port: u16,
    /// Password for `AUTH`.
    pub password: Option<String>,
    /// Logical database index.
    pub database: u8,
    /// Connection pool size.
    pub pool_size: usize,
    /// Connection establishment timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Per-command timeout in milliseconds.
    pub command_timeout_ms: u64,
    /// Reconnect delay unit; attempt `n` waits `n` times this value.
    pub reconnect_initial_delay_ms: u64,
    /// Ceiling for a single reconnect delay.
    pub reconnect_max_delay_ms: u64,
    /// Reconnect attempts before giving up.
    pub reconnect_max_attempts: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            database: 0,
            pool_size: 16,
            connect_timeout_ms: 5_000,
            command_timeout_ms: 2_000,
            reconnect_initial_delay_ms: 50,
            reconnect_max_delay_ms: 2_000,
            reconnect_max_attempts: 10,
        }
    }
}

impl RedisConfig {
    /// Returns the connection URL, building it from the discrete fields
    /// unless an explicit `url` is configured.
    #[must_use]
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }

        match &self.password {
            Some(password) if !password.is_empty() => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            ),
            _ => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }

    /// Returns the connect timeout as a Duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns the command timeout as a Duration.
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Returns the reconnect delay unit as a Duration.
    #[must_use]
    pub const fn reconnect_initial_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_delay_ms)
    }

    /// Returns the reconnect delay ceiling as a Duration.
    #[must_use]
    pub const fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Application-wide key prefix.
    pub key_prefix: String,
    /// TTL used by `set` when the caller does not name one.
    pub default_ttl_secs: u64,
    /// Largest response body the route cache will buffer.
    pub max_body_bytes: usize,
    /// Per-namespace TTL table.
    pub ttl: TtlTable,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: "bc".to_string(),
            default_ttl_secs: 3600,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            ttl: TtlTable::default(),
        }
    }
}

impl CacheConfig {
    /// Returns the default TTL as a Duration.
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

/// TTL in seconds for each cache namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlTable {
    pub session: u64,
    pub user: u64,
    pub stylist: u64,
    pub stylists: u64,
    pub services: u64,
    pub availability: u64,
    pub search: u64,
    pub verification: u64,
    pub stats: u64,
    pub route: u64,
}

impl Default for TtlTable {
    fn default() -> Self {
        Self {
            session: 3600,
            user: 1800,
            stylist: 1800,
            stylists: 600,
            services: 1800,
            availability: 300,
            search: 300,
            verification: 600,
            stats: 300,
            route: 300,
        }
    }
}

impl TtlTable {
    /// Returns each entry with its name, for validation and logging.
    #[must_use]
    pub fn entries(&self) -> [(&'static str, u64); 10] {
        [
            ("session", self.session),
            ("user", self.user),
            ("stylist", self.stylist),
            ("stylists", self.stylists),
            ("services", self.services),
            ("availability", self.availability),
            ("search", self.search),
            ("verification", self.verification),
            ("stats", self.stats),
            ("route", self.route),
        ]
    }
}

/// Quota for one class of requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Requests allowed per window.
    pub max_attempts: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl QuotaConfig {
    /// Returns the window as a Duration.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Rate limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Quota applied to every API request, keyed by client address.
    pub general: QuotaConfig,
    /// Quota applied to authentication attempts, keyed by submitted identity.
    pub auth: QuotaConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            general: QuotaConfig {
                max_attempts: 100,
                window_secs: 60,
            },
            auth: QuotaConfig {
                max_attempts: 5,
                window_secs: 900,
            },
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log format (json, pretty).
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl ObservabilityConfig {
    /// Builds the subscriber configuration.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            filter: format!("{},bc=debug,tower_http=debug", self.log_level.to_lowercase()),
            format: self.log_format,
        }
    }
}
