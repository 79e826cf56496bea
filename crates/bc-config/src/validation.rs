//! Startup checks for the configuration tree.
//!
//! Every violation is collected so one failed start reports all of them.

use crate::AppConfig;
use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// A single configuration violation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigValidationError {
    #[error("Invalid port for {name}: {value} (must be 1-65535)")]
    InvalidPort { name: String, value: u16 },

    #[error("Redis pool size must be at least 1")]
    EmptyPool,

    #[error("Pool size {value} exceeds maximum allowed ({maximum})")]
    PoolSizeTooLarge { value: usize, maximum: usize },

    #[error("Invalid {url_type} URL: {message}")]
    InvalidUrl { url_type: String, message: String },

    #[error("Timeout '{name}' must be positive, got {value}")]
    NonPositiveTimeout { name: String, value: u64 },

    /// The cache never writes permanent keys, so a zero TTL is rejected.
    #[error("TTL '{name}' must be positive")]
    NonPositiveTtl { name: String },

    #[error(
        "Invalid cache key prefix '{value}' \
         (must be non-empty and contain no ':', '*', '?', '[', ']' or whitespace)"
    )]
    InvalidKeyPrefix { value: String },

    #[error("Rate limit '{name}' needs a positive max_attempts and window_secs")]
    InvalidQuota { name: String },

    #[error("Invalid reconnect policy: {message}")]
    InvalidReconnectPolicy { message: String },

    #[error("Trusted proxy '{value}' is not an IP address")]
    InvalidTrustedProxy { value: String },

    #[error("Admin token must be at least {minimum} characters")]
    WeakAdminToken { minimum: usize },

    #[error("Invalid log level: '{value}' (valid: trace, debug, info, warn, error)")]
    InvalidLogLevel { value: String },
}

/// Checks an [`AppConfig`] before anything is built from it.
pub struct ConfigValidator;

impl ConfigValidator {
    const MAX_POOL_SIZE: usize = 1000;
    const MIN_ADMIN_TOKEN_LEN: usize = 16;
    const LOG_LEVELS: [&'static str; 5] = ["trace", "debug", "info", "warn", "error"];
    /// Would break key composition or glob invalidation.
    const RESERVED_PREFIX_CHARS: [char; 5] = [':', '*', '?', '[', ']'];

    /// Returns every violation found, or `Ok(())`.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        Self::validate_server(&config.server, &mut errors);
        Self::validate_redis(&config.redis, &mut errors);
        Self::validate_cache(&config.cache, &mut errors);
        Self::validate_rate_limit(&config.rate_limit, &mut errors);
        Self::validate_observability(&config.observability, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_server(config: &crate::ServerConfig, errors: &mut Vec<ConfigValidationError>) {
        if config.port == 0 {
            errors.push(ConfigValidationError::InvalidPort {
                name: "server.port".to_string(),
                value: config.port,
            });
        }

        if config.request_timeout_secs == 0 {
            errors.push(ConfigValidationError::NonPositiveTimeout {
                name: "server.request_timeout_secs".to_string(),
                value: 0,
            });
        }

        for proxy in &config.trusted_proxies {
            if proxy.trim().parse::<IpAddr>().is_err() {
                errors.push(ConfigValidationError::InvalidTrustedProxy {
                    value: proxy.clone(),
                });
            }
        }

        if config
            .admin_token()
            .is_some_and(|token| token.len() < Self::MIN_ADMIN_TOKEN_LEN)
        {
            errors.push(ConfigValidationError::WeakAdminToken {
                minimum: Self::MIN_ADMIN_TOKEN_LEN,
            });
        }
    }

    fn validate_redis(config: &crate::RedisConfig, errors: &mut Vec<ConfigValidationError>) {
        if !config.enabled {
            return;
        }

        let url = config.connection_url();
        match Url::parse(&url) {
            Ok(parsed) if parsed.scheme() == "redis" || parsed.scheme() == "rediss" => {}
            Ok(_) => errors.push(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: "URL must start with redis:// or rediss://".to_string(),
            }),
            Err(e) => errors.push(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: e.to_string(),
            }),
        }

        if config.url.is_none() && config.port == 0 {
            errors.push(ConfigValidationError::InvalidPort {
                name: "redis.port".to_string(),
                value: 0,
            });
        }

        if config.pool_size == 0 {
            errors.push(ConfigValidationError::EmptyPool);
        } else if config.pool_size > Self::MAX_POOL_SIZE {
            errors.push(ConfigValidationError::PoolSizeTooLarge {
                value: config.pool_size,
                maximum: Self::MAX_POOL_SIZE,
            });
        }

        for (name, value) in [
            ("redis.connect_timeout_ms", config.connect_timeout_ms),
            ("redis.command_timeout_ms", config.command_timeout_ms),
        ] {
            if value == 0 {
                errors.push(ConfigValidationError::NonPositiveTimeout {
                    name: name.to_string(),
                    value,
                });
            }
        }

        if config.reconnect_max_attempts == 0 {
            errors.push(ConfigValidationError::InvalidReconnectPolicy {
                message: "reconnect_max_attempts must be at least 1".to_string(),
            });
        }
        if config.reconnect_max_delay_ms < config.reconnect_initial_delay_ms {
            errors.push(ConfigValidationError::InvalidReconnectPolicy {
                message: format!(
                    "reconnect_max_delay_ms ({}) is below reconnect_initial_delay_ms ({})",
                    config.reconnect_max_delay_ms, config.reconnect_initial_delay_ms
                ),
            });
        }
    }

    fn validate_cache(config: &crate::CacheConfig, errors: &mut Vec<ConfigValidationError>) {
        if config.key_prefix.is_empty()
            || config.key_prefix.contains(Self::RESERVED_PREFIX_CHARS.as_slice())
            || config.key_prefix.chars().any(char::is_whitespace)
        {
            errors.push(ConfigValidationError::InvalidKeyPrefix {
                value: config.key_prefix.clone(),
            });
        }

        if config.default_ttl_secs == 0 {
            errors.push(ConfigValidationError::NonPositiveTtl {
                name: "cache.default_ttl_secs".to_string(),
            });
        }

        for (name, secs) in config.ttl.entries() {
            if secs == 0 {
                errors.push(ConfigValidationError::NonPositiveTtl {
                    name: format!("cache.ttl.{}", name),
                });
            }
        }
    }

    fn validate_rate_limit(
        config: &crate::RateLimitConfig,
        errors: &mut Vec<ConfigValidationError>,
    ) {
        for (name, quota) in [("general", config.general), ("auth", config.auth)] {
            if quota.max_attempts == 0 || quota.window_secs == 0 {
                errors.push(ConfigValidationError::InvalidQuota {
                    name: name.to_string(),
                });
            }
        }
    }

    fn validate_observability(
        config: &crate::ObservabilityConfig,
        errors: &mut Vec<ConfigValidationError>,
    ) {
        let level = config.log_level.to_lowercase();
        if !Self::LOG_LEVELS.contains(&level.as_str()) {
            errors.push(ConfigValidationError::InvalidLogLevel {
                value: config.log_level.clone(),
            });
        }
    }
}

/// Renders violations as a numbered list under one heading.
pub fn format_validation_errors(errors: &[ConfigValidationError]) -> String {
    errors
        .iter()
        .enumerate()
        .fold(String::from("Configuration validation failed:\n"), |mut out, (i, e)| {
            out.push_str(&format!("  {}. {}\n", i + 1, e));
            out
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig::default()
    }

    fn errors_of(config: &AppConfig) -> Vec<ConfigValidationError> {
        ConfigValidator::validate(config).unwrap_err()
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(ConfigValidator::validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_invalid_port() {
        let mut config = valid_config();
        config.server.port = 0;

        assert!(errors_of(&config).iter().any(|e| matches!(
            e,
            ConfigValidationError::InvalidPort { name, .. } if name == "server.port"
        )));
    }

    #[test]
    fn test_trusted_proxies_must_be_addresses() {
        let mut config = valid_config();
        config.server.trusted_proxies = vec!["10.0.0.1".to_string(), "::1".to_string()];
        assert!(ConfigValidator::validate(&config).is_ok());

        config.server.trusted_proxies.push("proxy.internal".to_string());
        assert_eq!(
            errors_of(&config),
            vec![ConfigValidationError::InvalidTrustedProxy {
                value: "proxy.internal".to_string()
            }]
        );
    }

    #[test]
    fn test_short_admin_token_rejected() {
        let mut config = valid_config();
        config.server.admin_token = Some("secret".to_string());
        assert!(errors_of(&config)
            .iter()
            .any(|e| matches!(e, ConfigValidationError::WeakAdminToken { .. })));

        config.server.admin_token = Some("0123456789abcdef".to_string());
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_redis_url() {
        let mut config = valid_config();
        config.redis.url = Some("http://localhost:6379".to_string());

        assert!(errors_of(&config).iter().any(|e| matches!(
            e,
            ConfigValidationError::InvalidUrl { url_type, .. } if url_type == "redis"
        )));
    }

    #[test]
    fn test_disabled_redis_skips_checks() {
        let mut config = valid_config();
        config.redis.enabled = false;
        config.redis.url = Some("not a url".to_string());
        config.redis.pool_size = 0;

        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut config = valid_config();
        config.cache.ttl.availability = 0;

        assert!(errors_of(&config).iter().any(|e| matches!(
            e,
            ConfigValidationError::NonPositiveTtl { name } if name == "cache.ttl.availability"
        )));
    }

    #[test]
    fn test_key_prefix_with_separator_rejected() {
        let mut config = valid_config();
        config.cache.key_prefix = "bc:prod".to_string();

        assert!(errors_of(&config)
            .iter()
            .any(|e| matches!(e, ConfigValidationError::InvalidKeyPrefix { .. })));
    }

    #[test]
    fn test_empty_key_prefix_rejected() {
        let mut config = valid_config();
        config.cache.key_prefix = String::new();

        assert!(errors_of(&config)
            .iter()
            .any(|e| matches!(e, ConfigValidationError::InvalidKeyPrefix { .. })));
    }

    #[test]
    fn test_zero_quota_rejected() {
        let mut config = valid_config();
        config.rate_limit.auth.window_secs = 0;

        assert!(errors_of(&config).iter().any(|e| matches!(
            e,
            ConfigValidationError::InvalidQuota { name } if name == "auth"
        )));
    }

    #[test]
    fn test_reconnect_ceiling_below_initial() {
        let mut config = valid_config();
        config.redis.reconnect_initial_delay_ms = 500;
        config.redis.reconnect_max_delay_ms = 100;

        assert!(errors_of(&config)
            .iter()
            .any(|e| matches!(e, ConfigValidationError::InvalidReconnectPolicy { .. })));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = valid_config();
        config.observability.log_level = "loud".to_string();

        assert!(errors_of(&config)
            .iter()
            .any(|e| matches!(e, ConfigValidationError::InvalidLogLevel { .. })));
    }

    #[test]
    fn test_multiple_errors() {
        let mut config = valid_config();
        config.server.port = 0;
        config.redis.pool_size = 0;
        config.cache.ttl.search = 0;

        assert!(errors_of(&config).len() >= 3);
    }

    #[test]
    fn test_format_validation_errors() {
        let errors = vec![
            ConfigValidationError::NonPositiveTtl {
                name: "cache.ttl.search".to_string(),
            },
            ConfigValidationError::InvalidPort {
                name: "server.port".to_string(),
                value: 0,
            },
        ];

        let output = format_validation_errors(&errors);
        assert!(output.contains("TTL 'cache.ttl.search'"));
        assert!(output.contains("Invalid port"));
    }
}
