//! Configuration loader with layered sources.

use crate::{format_validation_errors, AppConfig, ConfigValidator};
use bc_core::BcError;
use config::{Config, ConfigError, Environment, File};
use std::path::Path;
use tracing::{debug, info, warn};

/// Loads and validates the configuration once at startup.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config: AppConfig,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{environment}.toml` - Environment-specific overrides
    /// 3. `config/local.toml` - Uncommitted local overrides
    /// 4. Environment variables with `BC__` prefix
    pub fn new(config_dir: impl Into<String>) -> Result<Self, BcError> {
        let config = Self::load_config(&config_dir.into())?;
        Ok(Self { config })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> Result<Self, BcError> {
        Self::new("./config")
    }

    /// Returns the loaded configuration.
    #[must_use]
    pub fn get(&self) -> AppConfig {
        self.config.clone()
    }

    /// Loads configuration from the specified directory.
    fn load_config(config_dir: &str) -> Result<AppConfig, BcError> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var("BC_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        info!("Loading configuration for environment: {}", environment);

        let mut builder = Config::builder();

        for name in ["default", environment.as_str(), "local"] {
            let path = format!("{}/{}.toml", config_dir, name);
            if Path::new(&path).exists() {
                debug!("Loading config from: {}", path);
                builder = builder.add_source(File::with_name(&path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("BC")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("server.cors_origins")
                .with_list_parse_key("server.trusted_proxies"),
        );

        let config = builder.build().map_err(config_error_to_bc_error)?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(config_error_to_bc_error)?;

        Self::validate_config(&app_config)?;

        Ok(app_config)
    }

    /// Validates the configuration, failing on the first batch of errors.
    fn validate_config(config: &AppConfig) -> Result<(), BcError> {
        let production = config.app.environment == "production";
        if production && config.redis.password.is_none() && config.redis.url.is_none() {
            warn!("Redis has no password configured in production");
        }

        ConfigValidator::validate(config)
            .map_err(|errors| BcError::Configuration(format_validation_errors(&errors)))
    }
}

fn config_error_to_bc_error(err: ConfigError) -> BcError {
    BcError::Configuration(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.cache.key_prefix, "bc");
        assert!(config.redis.enabled);
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "default.toml",
            r#"
[server]
port = 9000

[cache]
key_prefix = "bctest"

[cache.ttl]
availability = 120
"#,
        );

        let loader = ConfigLoader::new(dir.path().to_string_lossy().to_string()).unwrap();
        let config = loader.get();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.cache.key_prefix, "bctest");
        assert_eq!(config.cache.ttl.availability, 120);
        // Unspecified entries keep their defaults.
        assert_eq!(config.cache.ttl.session, 3600);
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "default.toml",
            r#"
[cache.ttl]
search = 0
"#,
        );

        let result = ConfigLoader::new(dir.path().to_string_lossy().to_string());
        assert!(matches!(result, Err(BcError::Configuration(_))));
    }
}
