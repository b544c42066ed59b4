//! Token bucket limiter.
//!
//! The limiter owns no bucket data. It turns an identity into a store key,
//! stamps the request with the current time and hands the whole decision to
//! the store's atomic check-and-consume.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::clock::{Clock, SystemClock};
use super::key::{BucketKey, DEFAULT_KEY_PREFIX};
use super::state::{BucketState, CheckParams};
use super::store::BucketStore;
use crate::error::{QuotaError, Result};

/// Default bucket size.
const DEFAULT_CAPACITY: u32 = 10;
/// Default refill: ten tokens per minute.
const DEFAULT_REFILL_RATE: f64 = 10.0 / 60.0;

/// Process-wide limiter settings, fixed once the limiter is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Maximum tokens a bucket holds
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    /// Tokens added per second
    #[serde(default = "default_refill_rate")]
    pub refill_rate: f64,

    /// Namespace prepended to identities to form store keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_rate: default_refill_rate(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_capacity() -> u32 {
    DEFAULT_CAPACITY
}

fn default_refill_rate() -> f64 {
    DEFAULT_REFILL_RATE
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

impl LimiterConfig {
    /// Create a configuration with the default key prefix.
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            key_prefix: default_key_prefix(),
        }
    }

    /// Check `capacity >= 1` and a finite, positive `refill_rate`.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(QuotaError::InvalidArgument(
                "capacity must be at least 1".to_string(),
            ));
        }
        if !self.refill_rate.is_finite() || self.refill_rate <= 0.0 {
            return Err(QuotaError::InvalidArgument(format!(
                "refill_rate must be a positive number, got {}",
                self.refill_rate
            )));
        }
        Ok(())
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Tokens were available and have been consumed.
    Admitted,
    /// The bucket lacked tokens; nothing was persisted.
    Denied,
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted)
    }
}

/// Enforces a per-identity token bucket quota against a shared store.
///
/// This struct is stateless apart from its configuration and can be shared
/// across any number of tasks behind an `Arc`.
pub struct TokenBucketLimiter {
    config: LimiterConfig,
    store: Arc<dyn BucketStore>,
    clock: Arc<dyn Clock>,
}

impl TokenBucketLimiter {
    /// Create a limiter reading wall-clock time.
    pub fn new(config: LimiterConfig, store: Arc<dyn BucketStore>) -> Result<Self> {
        Self::with_clock(config, store, Arc::new(SystemClock::new()))
    }

    /// Create a limiter with an explicit time source.
    pub fn with_clock(
        config: LimiterConfig,
        store: Arc<dyn BucketStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            clock,
        })
    }

    /// The limiter's configuration.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// The store key for `identity`.
    pub fn key_for(&self, identity: &str) -> Result<BucketKey> {
        BucketKey::new(&self.config.key_prefix, identity)
    }

    /// Check and, if possible, consume `cost` tokens for `identity`.
    ///
    /// Fails with [`QuotaError::InvalidArgument`] before touching the store
    /// when `identity` is empty or `cost` is zero, and with
    /// [`QuotaError::StoreUnavailable`] when the store cannot decide.
    pub async fn check(&self, identity: &str, cost: u32) -> Result<Decision> {
        if cost == 0 {
            return Err(QuotaError::InvalidArgument(
                "cost must be at least 1".to_string(),
            ));
        }
        let key = self.key_for(identity)?;

        let params = CheckParams {
            capacity: self.config.capacity,
            refill_rate: self.config.refill_rate,
            now: self.clock.now(),
            cost,
        };

        trace!(key = %key, cost = cost, now = params.now, "Checking token bucket");

        let admitted = self
            .store
            .check_and_consume(&key, &params)
            .await
            .inspect_err(|e| warn!(key = %key, error = %e, "Bucket store failed"))?;

        if admitted {
            Ok(Decision::Admitted)
        } else {
            debug!(key = %key, cost = cost, "Rate limit exceeded");
            Ok(Decision::Denied)
        }
    }

    /// Returns `true` iff `cost` tokens were consumed for `identity`.
    pub async fn admit(&self, identity: &str, cost: u32) -> Result<bool> {
        self.check(identity, cost).await.map(|d| d.is_admitted())
    }

    /// [`admit`](Self::admit) with a cost of one token.
    pub async fn admit_one(&self, identity: &str) -> Result<bool> {
        self.admit(identity, 1).await
    }

    /// The persisted bucket of `identity`, if one has been written.
    ///
    /// The stored value reflects the last admission; refill since then is not
    /// applied.
    pub async fn inspect(&self, identity: &str) -> Result<Option<BucketState>> {
        let key = self.key_for(identity)?;
        self.store.load(&key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::memory::MemoryStore;
    use std::time::Duration;

    const START: f64 = 1_700_000_000.0;

    fn setup(capacity: u32, refill_rate: f64) -> (TokenBucketLimiter, Arc<MemoryStore>, ManualClock) {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(START);
        let limiter = TokenBucketLimiter::with_clock(
            LimiterConfig::new(capacity, refill_rate),
            store.clone(),
            Arc::new(clock.clone()),
        )
        .unwrap();
        (limiter, store, clock)
    }

    #[test]
    fn test_config_validation() {
        assert!(LimiterConfig::default().validate().is_ok());
        assert!(LimiterConfig::new(0, 1.0).validate().is_err());
        assert!(LimiterConfig::new(1, 0.0).validate().is_err());
        assert!(LimiterConfig::new(1, -2.0).validate().is_err());
        assert!(LimiterConfig::new(1, f64::NAN).validate().is_err());
        assert!(LimiterConfig::new(1, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let result = TokenBucketLimiter::new(LimiterConfig::new(0, 1.0), Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(QuotaError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_first_admission_leaves_capacity_minus_cost() {
        let (limiter, _, _) = setup(10, 1.0);

        assert!(limiter.admit("alice", 4).await.unwrap());

        let state = limiter.inspect("alice").await.unwrap().unwrap();
        assert_eq!(state.tokens, 6.0);
        assert_eq!(state.last_updated, START);
    }

    #[tokio::test]
    async fn test_quota_example_ten_per_minute() {
        let (limiter, _, clock) = setup(10, 10.0 / 60.0);

        for i in 1..=10 {
            assert!(limiter.admit_one("user").await.unwrap(), "Request {} should be admitted", i);
        }
        assert!(!limiter.admit_one("user").await.unwrap());

        // Just over six seconds buys one token.
        clock.advance(Duration::from_millis(6_010));
        assert!(limiter.admit_one("user").await.unwrap());
        assert!(!limiter.admit_one("user").await.unwrap());
    }

    #[tokio::test]
    async fn test_denial_does_not_persist() {
        let (limiter, _, clock) = setup(2, 0.5);

        assert!(limiter.admit("user", 2).await.unwrap());
        let exhausted = limiter.inspect("user").await.unwrap();

        clock.advance(Duration::from_secs(1));
        assert_eq!(limiter.check("user", 1).await.unwrap(), Decision::Denied);
        assert_eq!(limiter.inspect("user").await.unwrap(), exhausted);

        // Refill is still measured from the last admission.
        clock.advance(Duration::from_secs(1));
        assert!(limiter.admit("user", 1).await.unwrap());
        let state = limiter.inspect("user").await.unwrap().unwrap();
        assert_eq!(state.tokens, 0.0);
        assert_eq!(state.last_updated, START + 2.0);
    }

    #[tokio::test]
    async fn test_refill_never_exceeds_capacity() {
        let (limiter, _, clock) = setup(5, 100.0);

        assert!(limiter.admit("user", 5).await.unwrap());
        clock.advance(Duration::from_secs(600));

        assert!(!limiter.admit("user", 6).await.unwrap());
        assert!(limiter.admit("user", 1).await.unwrap());
        assert_eq!(limiter.inspect("user").await.unwrap().unwrap().tokens, 4.0);
    }

    #[tokio::test]
    async fn test_refill_is_linear_in_elapsed_time() {
        let (limiter, _, clock) = setup(100, 2.0);

        assert!(limiter.admit("user", 100).await.unwrap());
        clock.advance(Duration::from_secs(10));

        assert!(!limiter.admit("user", 21).await.unwrap());
        assert!(limiter.admit("user", 20).await.unwrap());
    }

    #[tokio::test]
    async fn test_identities_are_isolated() {
        let (limiter, _, _) = setup(3, 1.0);

        assert!(limiter.admit("a", 3).await.unwrap());
        assert!(!limiter.admit_one("a").await.unwrap());

        assert!(limiter.inspect("b").await.unwrap().is_none());
        assert!(limiter.admit("b", 3).await.unwrap());
        assert_eq!(limiter.inspect("a").await.unwrap().unwrap().tokens, 0.0);
    }

    #[tokio::test]
    async fn test_invalid_arguments_rejected_before_store() {
        let (limiter, store, _) = setup(3, 1.0);
        store.set_available(false);

        let err = limiter.admit("", 1).await.unwrap_err();
        assert!(matches!(err, QuotaError::InvalidArgument(_)));

        let err = limiter.admit("user", 0).await.unwrap_err();
        assert!(matches!(err, QuotaError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_store_failure_is_surfaced() {
        let (limiter, store, _) = setup(3, 1.0);
        assert!(limiter.admit_one("user").await.unwrap());

        store.set_available(false);
        let err = limiter.admit_one("user").await.unwrap_err();
        assert!(err.is_store_unavailable());

        store.set_available(true);
        assert!(limiter.admit_one("user").await.unwrap());
        assert_eq!(limiter.inspect("user").await.unwrap().unwrap().tokens, 1.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admissions_never_exceed_capacity() {
        let (limiter, _, _) = setup(10, 1e-9);
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.admit_one("shared").await.unwrap() })
            })
            .collect();

        let admitted = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .filter(|admitted| *admitted)
            .count();

        assert_eq!(admitted, 10);
    }

    #[tokio::test]
    async fn test_custom_key_prefix() {
        let store = Arc::new(MemoryStore::new());
        let config = LimiterConfig {
            key_prefix: "tenant-a:".to_string(),
            ..LimiterConfig::new(1, 1.0)
        };
        let limiter = TokenBucketLimiter::new(config, store).unwrap();

        assert_eq!(limiter.key_for("bob").unwrap().as_str(), "tenant-a:bob");
    }
}
