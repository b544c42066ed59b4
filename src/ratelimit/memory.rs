//! In-process bucket store.
//!
//! Buckets live in a sharded [`DashMap`]. The whole check-and-consume runs
//! while holding the entry lock of the key's shard, which serializes calls for
//! the same key while other shards proceed in parallel. Idle expiry is judged
//! against the `now` supplied by the caller, so a manual clock drives it in
//! tests exactly like wall time does in production.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::trace;

use super::key::BucketKey;
use super::state::{refill_and_consume, BucketState, CheckParams, Outcome, IDLE_EXPIRY};
use super::store::BucketStore;
use crate::error::{QuotaError, Result};

#[derive(Debug, Clone, Copy)]
struct Slot {
    state: BucketState,
    expires_at: f64,
}

impl Slot {
    fn written_at(state: BucketState, now: f64) -> Self {
        Self {
            state,
            expires_at: now + IDLE_EXPIRY.as_secs_f64(),
        }
    }

    fn is_expired(&self, now: f64) -> bool {
        now >= self.expires_at
    }
}

/// A bucket store kept in process memory.
///
/// Suitable for a single instance and for tests. It can be switched offline
/// with [`set_available`](Self::set_available) to exercise store failures.
#[derive(Debug)]
pub struct MemoryStore {
    buckets: DashMap<BucketKey, Slot>,
    available: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate losing (or regaining) the store connection.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Drop every bucket whose idle window has elapsed at `now`.
    ///
    /// Returns the number of buckets removed.
    pub fn purge_expired(&self, now: f64) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, slot| !slot.is_expired(now));
        before - self.buckets.len()
    }

    /// Number of materialized buckets, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no bucket has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(QuotaError::StoreUnavailable(
                "memory store is offline".to_string(),
            ))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BucketStore for MemoryStore {
    async fn check_and_consume(&self, key: &BucketKey, params: &CheckParams) -> Result<bool> {
        self.ensure_available()?;

        let admitted = match self.buckets.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let slot = *entry.get();
                let expired = slot.is_expired(params.now);
                let current = if expired { None } else { Some(slot.state) };

                match refill_and_consume(current, params) {
                    Outcome::Consumed(next) => {
                        entry.insert(Slot::written_at(next, params.now));
                        true
                    }
                    Outcome::Insufficient { .. } => {
                        if expired {
                            entry.remove();
                        }
                        false
                    }
                }
            }
            Entry::Vacant(entry) => match refill_and_consume(None, params) {
                Outcome::Consumed(next) => {
                    entry.insert(Slot::written_at(next, params.now));
                    true
                }
                Outcome::Insufficient { .. } => false,
            },
        };

        trace!(key = %key, admitted, "Memory store check");
        Ok(admitted)
    }

    async fn load(&self, key: &BucketKey) -> Result<Option<BucketState>> {
        self.ensure_available()?;
        Ok(self.buckets.get(key).map(|slot| slot.state))
    }
}
