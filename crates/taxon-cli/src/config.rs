//! Environment configuration for the `taxon` binary.
//!
//! Environment variables (a `.env` file is loaded first when present):
//!   DATABASE_URL              - PostgreSQL URL, required for store-backed commands
//!   DATABASE_MAX_CONNECTIONS  - pool size (default: 10)
//!   LOG_FORMAT                - "json" or "text" (default: "text")
//!   RUST_LOG                  - standard env filter

use std::str::FromStr;

use taxon_db::pool::DEFAULT_MAX_CONNECTIONS;
use taxon_db::PoolConfig;
use thiserror::Error;

/// Default `RUST_LOG` filter when the variable is unset.
pub const DEFAULT_LOG_FILTER: &str = "taxon=info,taxon_core=info,taxon_db=info";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::InvalidValue {
                name: "LOG_FORMAT",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub log_format: LogFormat,
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its
    /// value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidValue {
                    name: "DATABASE_MAX_CONNECTIONS",
                    value: raw,
                })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let log_format = match lookup("LOG_FORMAT") {
            Some(raw) => raw.parse()?,
            None => LogFormat::default(),
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_connections,
            log_format,
        })
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::MissingDatabaseUrl)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new().max_connections(self.max_connections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.database_url(), Err(ConfigError::MissingDatabaseUrl));
    }

    #[test]
    fn test_reads_all_variables() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/taxon"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();
        assert_eq!(config.database_url(), Ok("postgres://localhost/taxon"));
        assert_eq!(config.pool_config().max_connections, 4);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            config_from(&[("DATABASE_MAX_CONNECTIONS", "0")]),
            Err(ConfigError::InvalidValue { name: "DATABASE_MAX_CONNECTIONS", .. })
        ));
        assert!(matches!(
            config_from(&[("LOG_FORMAT", "yaml")]),
            Err(ConfigError::InvalidValue { name: "LOG_FORMAT", .. })
        ));
    }

    #[test]
    fn test_blank_database_url_is_missing() {
        let config = config_from(&[("DATABASE_URL", "  ")]).unwrap();
        assert!(config.database_url.is_none());
    }
}
