//! Token bucket state and the refill computation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long a bucket may sit without a successful admission before the store
/// drops it.
pub const IDLE_EXPIRY: Duration = Duration::from_secs(3600);

/// Persisted state of a single bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketState {
    /// Tokens currently available, in `[0, capacity]`.
    pub tokens: f64,
    /// Unix timestamp (seconds) of the last consuming write.
    pub last_updated: f64,
}

impl BucketState {
    /// A full bucket as seen at `now`. Used for identities with no stored state.
    pub fn full(capacity: u32, now: f64) -> Self {
        Self {
            tokens: capacity as f64,
            last_updated: now,
        }
    }

    /// Tokens available at `now` if nothing is consumed in between.
    pub fn refilled(&self, capacity: u32, refill_rate: f64, now: f64) -> f64 {
        let delta = (now - self.last_updated).max(0.0);
        (self.tokens + delta * refill_rate).min(capacity as f64)
    }
}

/// Arguments of one check-and-consume call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckParams {
    /// Maximum tokens a bucket holds.
    pub capacity: u32,
    /// Tokens added per second.
    pub refill_rate: f64,
    /// Unix timestamp (seconds) of the check.
    pub now: f64,
    /// Tokens requested.
    pub cost: u32,
}

/// Result of running the bucket algorithm against a stored state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// Tokens were consumed; the new state must be persisted.
    Consumed(BucketState),
    /// Not enough tokens; the stored state must stay untouched.
    Insufficient {
        /// Tokens that were available at check time.
        available: f64,
    },
}

impl Outcome {
    /// Whether the request was admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Outcome::Consumed(_))
    }
}

/// Refill `current` up to `params.now` and try to take `params.cost` tokens.
///
/// `None` stands for a bucket that was never written (or has expired) and is
/// treated as full. Stores call this while holding whatever per-key exclusion
/// they provide; the Lua script in [`super::RedisStore`] is the same computation.
pub fn refill_and_consume(current: Option<BucketState>, params: &CheckParams) -> Outcome {
    let state = current.unwrap_or_else(|| BucketState::full(params.capacity, params.now));
    let filled = state.refilled(params.capacity, params.refill_rate, params.now);
    let cost = params.cost as f64;

    if filled >= cost {
        Outcome::Consumed(BucketState {
            tokens: filled - cost,
            last_updated: params.now,
        })
    } else {
        Outcome::Insufficient { available: filled }
    }
}
