//! Process configuration
//!
//! Configuration can be loaded from a TOML file and/or environment variables.
//! Environment values override file values. Loaded once at startup.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::api::ApiConfig;
use crate::client::UpstreamConfig;
use crate::keystore::KeyStoreConfig;
use crate::logging::{self, LogConfig};
use crate::server::ServerConfig;

/// Names a TOML file to load before applying the environment
pub const CONFIG_PATH_VAR: &str = "RELAY_CONFIG";

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Inbound RTMP listener
    pub server: ServerConfig,

    /// Upstream server every publish is forwarded to
    pub upstream: UpstreamConfig,

    /// Stream key store
    pub keystore: KeyStoreConfig,

    /// HTTP issuance API
    pub api: ApiConfig,

    pub log: LogConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load the optional file named by `RELAY_CONFIG`, apply the
    /// environment on top and validate the result
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) if !path.is_empty() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `lookup`, which maps variable names to values
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server
        if let Some(addr) = lookup("RELAY_ADDRESS") {
            self.server.bind_addr = parse_var("RELAY_ADDRESS", &addr)?;
        }

        // Upstream
        if let Some(host) = lookup("RELAY_UPSTREAM_HOST") {
            self.upstream.host = host;
        }
        if let Some(secs) = lookup("RELAY_UPSTREAM_TIMEOUT_SECS") {
            self.upstream.timeout_secs = parse_var("RELAY_UPSTREAM_TIMEOUT_SECS", &secs)?;
        }

        // API
        if let Some(addr) = lookup("RELAY_API_ADDRESS") {
            self.api.bind_addr = parse_var("RELAY_API_ADDRESS", &addr)?;
        }

        // Key store
        if let Some(secs) = lookup("RELAY_KEY_SWEEP_SECS") {
            self.keystore.sweep_interval_secs = parse_var("RELAY_KEY_SWEEP_SECS", &secs)?;
        }
        if let Some(minutes) = lookup("RELAY_KEY_DEFAULT_MINUTES") {
            self.keystore.default_duration_minutes =
                parse_var("RELAY_KEY_DEFAULT_MINUTES", &minutes)?;
        }

        // Logging
        if let Some(level) = lookup("RELAY_LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(path) = lookup("RELAY_LOG_PATH") {
            self.log.path = path;
        }
        if let Some(stdout) = lookup("RELAY_LOG_STDOUT") {
            self.log.stdout = parse_var("RELAY_LOG_STDOUT", &stdout)?;
        }
        if let Some(json) = lookup("RELAY_LOG_JSON") {
            self.log.json = parse_var("RELAY_LOG_JSON", &json)?;
        }
        if let Some(size) = lookup("RELAY_LOG_MAX_SIZE_MB") {
            self.log.max_size_mb = parse_var("RELAY_LOG_MAX_SIZE_MB", &size)?;
        }
        if let Some(backups) = lookup("RELAY_LOG_MAX_BACKUPS") {
            self.log.max_backups = parse_var("RELAY_LOG_MAX_BACKUPS", &backups)?;
        }
        if let Some(compress) = lookup("RELAY_LOG_COMPRESS") {
            self.log.compress = parse_var("RELAY_LOG_COMPRESS", &compress)?;
        }

        Ok(())
    }

    /// Reject configurations the relay cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.upstream
            .address()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.keystore.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "key sweep interval must be positive".into(),
            ));
        }
        if self.keystore.default_duration_minutes == 0 {
            return Err(ConfigError::Invalid(
                "default key duration must be positive".into(),
            ));
        }

        if !self.log.path.is_empty() && self.log.max_size_mb == 0 {
            return Err(ConfigError::Invalid(
                "log max_size_mb must be positive".into(),
            ));
        }

        logging::parse_level(&self.log.level)?;
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("{0} is not a valid log level")]
    LogLevel(String),

    #[error("logging setup failed: {0}")]
    Logging(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_addr.port(), 1935);
        assert_eq!(config.api.bind_addr.port(), 8080);
        assert_eq!(config.keystore.sweep_interval_secs, 60);
        assert_eq!(config.keystore.default_duration_minutes, 1440);
        assert_eq!(config.log.level, "info");
        assert!(config.upstream.host.is_empty());
    }

    #[test]
    fn test_default_requires_upstream() {
        let err = AppConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
[server]
bind_addr = "127.0.0.1:1936"

[upstream]
host = "wowza.example.com"
timeout_secs = 5

[keystore]
sweep_interval_secs = 30

[log]
level = "debug"
json = false
"#;

        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_addr.port(), 1936);
        assert_eq!(config.upstream.host, "wowza.example.com");
        assert_eq!(config.upstream.timeout_secs, 5);
        assert_eq!(config.keystore.sweep_interval_secs, 30);
        assert_eq!(config.keystore.default_duration_minutes, 1440);
        assert_eq!(config.log.level, "debug");
        assert!(!config.log.json);
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("RELAY_ADDRESS", "127.0.0.1:2935"),
                ("RELAY_UPSTREAM_HOST", "rtmp://upstream.example"),
                ("RELAY_API_ADDRESS", "127.0.0.1:9090"),
                ("RELAY_KEY_DEFAULT_MINUTES", "60"),
                ("RELAY_LOG_STDOUT", "false"),
            ]))
            .unwrap();

        assert_eq!(config.server.bind_addr.port(), 2935);
        assert_eq!(config.api.bind_addr.port(), 9090);
        assert_eq!(config.upstream.address().unwrap(), "upstream.example:1935");
        assert_eq!(config.keystore.default_duration_minutes, 60);
        assert!(!config.log.stdout);
        config.validate().unwrap();
    }

    #[test]
    fn test_env_log_rotation() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("RELAY_UPSTREAM_HOST", "upstream.example"),
                ("RELAY_LOG_PATH", "/var/log/relay.log"),
                ("RELAY_LOG_MAX_SIZE_MB", "100"),
                ("RELAY_LOG_MAX_BACKUPS", "5"),
                ("RELAY_LOG_COMPRESS", "false"),
            ]))
            .unwrap();

        assert_eq!(config.log.path, "/var/log/relay.log");
        assert_eq!(config.log.max_size_mb, 100);
        assert_eq!(config.log.max_backups, 5);
        assert!(!config.log.compress);
        config.validate().unwrap();

        config.log.max_size_mb = 0;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Invalid(_)
        ));
    }

    #[test]
    fn test_env_invalid_value() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(env(&[("RELAY_KEY_SWEEP_SECS", "soon")]))
            .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "RELAY_KEY_SWEEP_SECS",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_rejects_zero_sweep() {
        let mut config = AppConfig::default();
        config.upstream.host = "upstream.example".into();
        config.keystore.sweep_interval_secs = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_log_level() {
        let mut config = AppConfig::default();
        config.upstream.host = "upstream.example".into();
        config.log.level = "loud".into();

        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::LogLevel(_)
        ));
    }
}
