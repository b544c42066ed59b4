//! Token bucket limiting and bucket stores.

mod clock;
mod key;
mod limiter;
mod memory;
mod redis_store;
mod state;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::{BucketKey, DEFAULT_KEY_PREFIX};
pub use limiter::{Decision, LimiterConfig, TokenBucketLimiter};
pub use memory::MemoryStore;
pub use redis_store::{RedisStore, RedisStoreConfig};
pub use state::{refill_and_consume, BucketState, CheckParams, Outcome, IDLE_EXPIRY};
pub use store::BucketStore;
