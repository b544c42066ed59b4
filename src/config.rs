//! Configuration management for quota-bucket.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{QuotaError, Result};
use crate::ratelimit::{LimiterConfig, RedisStoreConfig};

/// Prefix of environment variables layered over the config file,
/// e.g. `QUOTA__LIMITER__CAPACITY=20`.
const ENV_PREFIX: &str = "QUOTA";

/// Main configuration for the quota service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Token bucket settings
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Shared store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

/// Shared store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Round-trip timeout in milliseconds; 0 disables it
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_timeout_ms() -> u64 {
    1000
}

impl StoreConfig {
    /// Settings for [`RedisStore`](crate::ratelimit::RedisStore).
    pub fn redis_store_config(&self) -> RedisStoreConfig {
        RedisStoreConfig {
            timeout: (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms)),
        }
    }
}

impl QuotaConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| QuotaError::Config(e.to_string()))
    }

    /// Load configuration from an optional file, then `QUOTA__*` environment
    /// variables, then `REDIS_URL`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );
        if let Ok(url) = std::env::var("REDIS_URL") {
            builder = builder.set_override("store.redis_url", url)?;
        }

        let config: QuotaConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Check the limiter invariants and store settings.
    pub fn validate(&self) -> Result<()> {
        self.limiter
            .validate()
            .map_err(|e| QuotaError::Config(e.to_string()))?;

        if self.store.redis_url.is_empty() {
            return Err(QuotaError::Config("store.redis_url must be set".to_string()));
        }
        Ok(())
    }
}
