//! Server configuration.
//!
//! Every setting comes from the process environment. Only `API_KEY` is
//! required; the rest fall back to defaults.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `API_KEY` | required, non-empty |
//! | `SHARDKV_HOST` | `0.0.0.0` |
//! | `SHARDKV_PORT` | `4000` |
//! | `SHARDKV_SHARDS` | `16` |
//! | `SHARDKV_MAX_CONNECTIONS` | `100` |
//! | `SHARDKV_QUEUE_CAPACITY` | `50` |
//! | `SHARDKV_MAX_KEY_SIZE` | `256` |
//! | `SHARDKV_MAX_VALUE_SIZE` | `10240` |
//! | `SHARDKV_WORKERS` | `3` |
//! | `SHARDKV_REAP_INTERVAL_SECS` | `60` |

use crate::connection::{AdmissionConfig, PoolConfig};
use crate::protocol::{FrameLimits, MAX_KEY_SIZE, MAX_VALUE_SIZE};
use crate::storage::{ExpiryConfig, DEFAULT_SHARDS};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// The default host the server binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// The default port the server listens on
pub const DEFAULT_PORT: u16 = 4000;

/// Errors raised while loading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("environment variable {0} must not be empty")]
    Empty(&'static str),

    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

/// Everything the server needs to start.
#[derive(Clone)]
pub struct ServerConfig {
    pub api_key: String,
    pub host: String,
    pub port: u16,
    pub shards: usize,
    pub max_connections: usize,
    pub queue_capacity: usize,
    pub max_key_size: usize,
    pub max_value_size: usize,
    pub workers: usize,
    pub reap_interval: Duration,
}

// The API key never reaches the logs
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("api_key", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("shards", &self.shards)
            .field("max_connections", &self.max_connections)
            .field("queue_capacity", &self.queue_capacity)
            .field("max_key_size", &self.max_key_size)
            .field("max_value_size", &self.max_value_size)
            .field("workers", &self.workers)
            .field("reap_interval", &self.reap_interval)
            .finish()
    }
}

impl ServerConfig {
    /// Loads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Loads the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("API_KEY").ok_or(ConfigError::Missing("API_KEY"))?;
        if api_key.is_empty() {
            return Err(ConfigError::Empty("API_KEY"));
        }

        let defaults = AdmissionConfig::default();
        let pool = PoolConfig::default();

        Ok(Self {
            api_key,
            host: lookup("SHARDKV_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_var(&lookup, "SHARDKV_PORT", DEFAULT_PORT)?,
            shards: parse_positive(&lookup, "SHARDKV_SHARDS", DEFAULT_SHARDS)?,
            max_connections: parse_positive(
                &lookup,
                "SHARDKV_MAX_CONNECTIONS",
                defaults.max_connections,
            )?,
            queue_capacity: parse_var(&lookup, "SHARDKV_QUEUE_CAPACITY", defaults.queue_capacity)?,
            max_key_size: parse_positive(&lookup, "SHARDKV_MAX_KEY_SIZE", MAX_KEY_SIZE)?,
            max_value_size: parse_positive(&lookup, "SHARDKV_MAX_VALUE_SIZE", MAX_VALUE_SIZE)?,
            workers: parse_positive(&lookup, "SHARDKV_WORKERS", pool.workers)?,
            reap_interval: Duration::from_secs(parse_positive(
                &lookup,
                "SHARDKV_REAP_INTERVAL_SECS",
                60,
            )?),
        })
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn frame_limits(&self) -> FrameLimits {
        FrameLimits {
            max_key_size: self.max_key_size,
            max_value_size: self.max_value_size,
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.workers,
            ..PoolConfig::default()
        }
    }

    pub fn admission_config(&self) -> AdmissionConfig {
        AdmissionConfig {
            max_connections: self.max_connections,
            queue_capacity: self.queue_capacity,
        }
    }

    pub fn expiry_config(&self) -> ExpiryConfig {
        ExpiryConfig {
            interval: self.reap_interval,
        }
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

fn parse_positive<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialEq + Default + ToString,
{
    let parsed = parse_var(lookup, var, default)?;
    if parsed == T::default() {
        return Err(ConfigError::Invalid {
            var,
            value: parsed.to_string(),
        });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("API_KEY", "penguins")]).unwrap();

        assert_eq!(config.api_key, "penguins");
        assert_eq!(config.bind_address(), "0.0.0.0:4000");
        assert_eq!(config.shards, 16);
        assert_eq!(config.max_connections, 100);
        assert_eq!(config.queue_capacity, 50);
        assert_eq!(config.workers, 3);
        assert_eq!(config.reap_interval, Duration::from_secs(60));
        assert_eq!(config.frame_limits(), FrameLimits::default());
    }

    #[test]
    fn test_missing_api_key() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("API_KEY"));
        assert_eq!(
            load(&[("API_KEY", "")]).unwrap_err(),
            ConfigError::Empty("API_KEY")
        );
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("API_KEY", "k"),
            ("SHARDKV_HOST", "127.0.0.1"),
            ("SHARDKV_PORT", "4100"),
            ("SHARDKV_SHARDS", "4"),
            ("SHARDKV_MAX_CONNECTIONS", "2"),
            ("SHARDKV_QUEUE_CAPACITY", "0"),
            ("SHARDKV_WORKERS", "1"),
            ("SHARDKV_REAP_INTERVAL_SECS", "5"),
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:4100");
        assert_eq!(config.shards, 4);
        assert_eq!(
            config.admission_config(),
            AdmissionConfig {
                max_connections: 2,
                queue_capacity: 0,
            }
        );
        assert_eq!(config.pool_config().workers, 1);
        assert_eq!(config.expiry_config().interval, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values() {
        assert_eq!(
            load(&[("API_KEY", "k"), ("SHARDKV_PORT", "http")]).unwrap_err(),
            ConfigError::Invalid {
                var: "SHARDKV_PORT",
                value: "http".to_string(),
            }
        );
        assert!(matches!(
            load(&[("API_KEY", "k"), ("SHARDKV_SHARDS", "0")]),
            Err(ConfigError::Invalid {
                var: "SHARDKV_SHARDS",
                ..
            })
        ));
        assert!(load(&[("API_KEY", "k"), ("SHARDKV_WORKERS", "-1")]).is_err());
    }

    #[test]
    fn test_debug_hides_api_key() {
        let config = load(&[("API_KEY", "super-secret")]).unwrap();
        assert!(!format!("{:?}", config).contains("super-secret"));
    }
}
