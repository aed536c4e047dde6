use std::time::Duration;

use crate::{VacancyError, redis::SharedStore, runtime};

/// Timing of the distributed lock.
#[derive(Clone, Debug)]
pub(crate) struct LockTiming {
    pub ttl: Duration,
    pub attempts: u32,
    pub backoff: Duration,
    pub max_jitter: Duration,
}

/// Delay before lock attempt `attempt + 1`.
///
/// `base * 2^attempt + max_jitter * jitter_sample`, where `jitter_sample` is
/// clamped into `[0, 1)`.
pub fn lock_retry_delay(
    attempt: u32,
    base: Duration,
    max_jitter: Duration,
    jitter_sample: f64,
) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(attempt));

    let sample = if jitter_sample.is_finite() {
        jitter_sample.clamp(0.0, 1.0 - f64::EPSILON)
    } else {
        0.0
    };

    exponential.saturating_add(max_jitter.mul_f64(sample))
}

/// A held distributed lock.
///
/// Only the token written at acquisition can release it. If the holder outlives
/// the TTL the lock simply expires, and a late release leaves the next holder's
/// lock in place.
#[must_use = "a held stock lock must be released"]
pub(crate) struct StockLock<'a, S: SharedStore> {
    store: &'a S,
    key: &'a str,
    token: String,
}

impl<'a, S: SharedStore> StockLock<'a, S> {
    pub(crate) async fn acquire(
        store: &'a S,
        key: &'a str,
        timing: &LockTiming,
    ) -> Result<Self, VacancyError> {
        let attempts = timing.attempts.max(1);

        for attempt in 0..attempts {
            let token = uuid::Uuid::new_v4().to_string();

            if store.acquire_lock(key, &token, timing.ttl).await? {
                return Ok(Self { store, key, token });
            }

            if attempt + 1 < attempts {
                let delay = lock_retry_delay(
                    attempt,
                    timing.backoff,
                    timing.max_jitter,
                    rand::random::<f64>(),
                );

                tracing::debug!(
                    key,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "redis.lock.busy"
                );

                runtime::sleep(delay).await;
            }
        }

        tracing::warn!(key, attempts, "redis.lock.exhausted");

        Err(VacancyError::LockUnavailable { attempts })
    } // end method acquire

    /// Release the lock. Problems are logged, never returned.
    pub(crate) async fn release(self) {
        match self.store.release_lock(self.key, &self.token).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(key = self.key, "redis.lock.release.not_owner");
            }
            Err(err) => {
                tracing::warn!(key = self.key, error = %err, "redis.lock.release.error");
            }
        }
    } // end method release
}
