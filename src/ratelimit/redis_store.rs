//! Redis-backed bucket store.
//!
//! Each bucket is a hash with `tokens` and `last_updated` fields. The
//! check-and-consume runs as a Lua script, which Redis executes without
//! interleaving any other command, so concurrent limiter instances sharing
//! one Redis see a single linear history per key.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use tracing::{debug, warn};

use super::key::BucketKey;
use super::state::{BucketState, CheckParams, IDLE_EXPIRY};
use super::store::BucketStore;
use crate::error::{QuotaError, Result};

/// KEYS[1] = bucket key
/// ARGV = capacity, refill_rate, now, cost, expiry seconds
const CHECK_AND_CONSUME_LUA: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local cost = tonumber(ARGV[4])
local expiry = tonumber(ARGV[5])

local state = redis.call("HMGET", key, "tokens", "last_updated")
local tokens = tonumber(state[1])
local last_updated = tonumber(state[2])

if not tokens or not last_updated then
    tokens = capacity
    last_updated = now
end

local delta = math.max(0, now - last_updated)
local filled = math.min(capacity, tokens + delta * refill_rate)

if filled < cost then
    return 0
end

redis.call("HSET", key,
    "tokens", string.format("%.17g", filled - cost),
    "last_updated", string.format("%.17g", now))
redis.call("EXPIRE", key, expiry)

return 1
"#;

/// Configuration for the Redis store.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Upper bound on one store round trip. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(1)),
        }
    }
}

/// Bucket store shared through Redis.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    script: Script,
    config: RedisStoreConfig,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis with the default configuration.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, RedisStoreConfig::default()).await
    }

    /// Connect to Redis with a custom configuration.
    ///
    /// # Errors
    /// Returns [`QuotaError::StoreUnavailable`] if the URL is invalid or the
    /// server cannot be reached.
    pub async fn connect_with_config(url: &str, config: RedisStoreConfig) -> Result<Self> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        debug!(url = %url, "Connected to Redis");

        Ok(Self::from_connection_manager(connection, config))
    }

    /// Build a store over an existing connection manager.
    pub fn from_connection_manager(connection: ConnectionManager, config: RedisStoreConfig) -> Self {
        Self {
            connection,
            script: Script::new(CHECK_AND_CONSUME_LUA),
            config,
        }
    }

    /// Remaining idle lifetime of `key` in seconds, as reported by `TTL`.
    ///
    /// Redis answers `-2` for a missing key and `-1` for a key without expiry.
    pub async fn ttl_secs(&self, key: &BucketKey) -> Result<i64> {
        let mut connection = self.connection.clone();
        self.bounded(async move {
            redis::cmd("TTL")
                .arg(key.as_str())
                .query_async(&mut connection)
                .await
        })
        .await
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        let result = match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, op).await.map_err(|_| {
                QuotaError::StoreUnavailable(format!("redis call timed out after {:?}", limit))
            })?,
            None => op.await,
        };

        result.map_err(|e| {
            warn!(error = %e, "Redis call failed");
            QuotaError::from(e)
        })
    }
}

#[async_trait]
impl BucketStore for RedisStore {
    async fn check_and_consume(&self, key: &BucketKey, params: &CheckParams) -> Result<bool> {
        let mut connection = self.connection.clone();
        let mut invocation = self.script.key(key.as_str());
        invocation
            .arg(params.capacity)
            .arg(params.refill_rate)
            .arg(params.now)
            .arg(params.cost)
            .arg(IDLE_EXPIRY.as_secs());

        let allowed: i64 = self
            .bounded(async move { invocation.invoke_async(&mut connection).await })
            .await?;

        Ok(allowed == 1)
    }

    async fn load(&self, key: &BucketKey) -> Result<Option<BucketState>> {
        let mut connection = self.connection.clone();
        let (tokens, last_updated): (Option<f64>, Option<f64>) = self
            .bounded(async move {
                redis::cmd("HMGET")
                    .arg(key.as_str())
                    .arg("tokens")
                    .arg("last_updated")
                    .query_async(&mut connection)
                    .await
            })
            .await?;

        Ok(match (tokens, last_updated) {
            (Some(tokens), Some(last_updated)) => Some(BucketState {
                tokens,
                last_updated,
            }),
            _ => None,
        })
    }
}
