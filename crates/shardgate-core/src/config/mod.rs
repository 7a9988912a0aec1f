//! Application configuration with layered loading.
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: hardcoded in the `default_*` functions below
//! 2. **Config file**: TOML file passed to [`AppConfig::load`]
//! 3. **Environment variables**: `SHARDGATE_*` overrides
//!
//! Invalid configurations (no observers, zero shard count, malformed
//! observer URLs) fail at load time rather than at first request.
//!
//! # Example
//!
//! ```toml
//! [general]
//! shard_count = 3
//! request_timeout_seconds = 10
//! mempool_api_enabled = true
//!
//! [[observers]]
//! address = "http://observer-0:8080"
//! shard_id = 0
//!
//! [[observers]]
//! address = "http://observer-0-history:8080"
//! shard_id = 0
//! full_history = true
//!
//! [[observers]]
//! address = "http://observer-meta:8080"
//! shard_id = 4294967295
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::observer::{Observer, ObserverKind};

/// Core proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Number of regular shards, metachain excluded. Must be greater
    /// than 0.
    pub shard_count: u32,

    /// Per-call timeout for observer requests in seconds. Defaults to `10`.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Whether the mempool API entry points are served. Defaults to
    /// `false`.
    #[serde(default)]
    pub mempool_api_enabled: bool,

    /// Decoded public-key length enforced by the address codec. Defaults to
    /// `32`.
    #[serde(default = "default_address_length")]
    pub address_length: usize,
}

fn default_request_timeout_seconds() -> u64 {
    10
}

fn default_address_length() -> usize {
    32
}

/// HTTP server settings for the client-facing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind to. Defaults to `127.0.0.1`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port to listen on. Defaults to `8079`.
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    8079
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), bind_port: default_bind_port() }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g. "trace", "debug", "info"). Defaults to `"info"`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

/// One configured observer node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverEntry {
    /// Base URL of the observer. Must start with `http` or `https`.
    pub address: String,

    /// Shard this observer serves; `4294967295` is the metachain.
    pub shard_id: u32,

    /// Whether the node retains full history. Defaults to `false`.
    #[serde(default)]
    pub full_history: bool,
}

impl ObserverEntry {
    #[must_use]
    pub fn to_observer(&self) -> Observer {
        let kind = if self.full_history {
            ObserverKind::FullHistoryObserver
        } else {
            ObserverKind::Observer
        };
        Observer::new(self.address.trim_end_matches('/'), self.shard_id, kind)
    }
}

/// Root configuration object consumed by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Ordered observer list; in-shard order is the retry order.
    pub observers: Vec<ObserverEntry>,
}

impl AppConfig {
    /// Loads configuration from an optional TOML file plus `SHARDGATE_*`
    /// environment overrides, then validates it.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when loading, deserialization or
    /// validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let settings = builder
            .add_source(Environment::with_prefix("SHARDGATE").separator("__"))
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validates invariants the rest of the system relies on.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError::Message`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.shard_count == 0 {
            return Err(ConfigError::Message("general.shard_count must be greater than 0".into()));
        }
        if self.general.request_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "general.request_timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.observers.is_empty() {
            return Err(ConfigError::Message("at least one observer must be configured".into()));
        }
        for entry in &self.observers {
            if !entry.address.starts_with("http") {
                return Err(ConfigError::Message(format!(
                    "observer address '{}' must start with http",
                    entry.address
                )));
            }
        }
        Ok(())
    }

    /// Per-call observer timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.general.request_timeout_seconds)
    }

    /// Builds the observer records for pool construction.
    #[must_use]
    pub fn to_observers(&self) -> Vec<Observer> {
        self.observers.iter().map(ObserverEntry::to_observer).collect()
    }
}
