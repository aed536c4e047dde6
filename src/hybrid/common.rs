use std::time::Duration;

use crate::{DistributedCounterOptions, RedisStoreOptions};

/// Options for [`HybridCounter`](crate::HybridCounter).
#[derive(Clone, Debug)]
pub struct HybridCounterOptions {
    /// Store to coordinate through. `None` starts directly in fallback mode.
    pub redis_url: Option<String>,
    /// Stock seeded into an empty store, and into the fallback counter when no
    /// better value is known.
    pub initial_stock: u64,
    /// Connect-and-seed attempts before starting in fallback mode.
    pub init_attempts: u32,
    /// Delay after the first failed initialization attempt.
    pub init_backoff: Duration,
    /// Growth factor of the initialization delay.
    pub init_backoff_multiplier: u32,
    /// Connection settings.
    pub store: RedisStoreOptions,
    /// Distributed counter settings. Its `cache_ttl` also applies to the fallback.
    pub counter: DistributedCounterOptions,
}

impl Default for HybridCounterOptions {
    fn default() -> Self {
        Self {
            redis_url: None,
            initial_stock: 1000,
            init_attempts: 5,
            init_backoff: Duration::from_millis(100),
            init_backoff_multiplier: 2,
            store: RedisStoreOptions::default(),
            counter: DistributedCounterOptions::default(),
        }
    }
}

/// Delay after failed initialization attempt `attempt` (zero-based):
/// `base * multiplier^attempt`.
pub fn init_retry_delay(attempt: u32, base: Duration, multiplier: u32) -> Duration {
    base.saturating_mul(multiplier.saturating_pow(attempt))
}
