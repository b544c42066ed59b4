//! Store trait for abstracting the shared bucket substrate.

use async_trait::async_trait;

use super::key::BucketKey;
use super::state::{BucketState, CheckParams};
use crate::error::Result;

/// A shared store holding bucket state.
///
/// This trait abstracts over the Redis store and the in-process
/// [`MemoryStore`](super::MemoryStore) so the limiter works with either.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Run the check-and-consume operation for `key` as one indivisible unit.
    ///
    /// Returns `true` if `params.cost` tokens were consumed. On `false` the
    /// stored state is left exactly as it was. A successful consumption resets
    /// the key's idle expiry to [`IDLE_EXPIRY`](super::IDLE_EXPIRY).
    ///
    /// Any failure to execute returns
    /// [`QuotaError::StoreUnavailable`](crate::error::QuotaError::StoreUnavailable).
    async fn check_and_consume(&self, key: &BucketKey, params: &CheckParams) -> Result<bool>;

    /// Read the persisted state of `key` without modifying it.
    async fn load(&self, key: &BucketKey) -> Result<Option<BucketState>>;
}
