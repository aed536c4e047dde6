use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use crate::{
    BackendKind, CacheTtlMs, HealthReport, HealthStatus, Quantity, Reservation, StockCounter,
    StoreHealth, VacancyError,
    read_cache::ReadCache,
    redis::{
        RedisKey, RedisStore, SharedStore, StockKeys,
        stock_lock::{LockTiming, StockLock},
    },
};

const NOT_OBSERVED: u64 = u64::MAX;

/// Options for [`DistributedCounter`].
#[derive(Clone, Debug)]
pub struct DistributedCounterOptions {
    /// Namespace shared by every process selling the same stock.
    pub prefix: RedisKey,
    /// Identifier of the stock counter inside the namespace.
    pub stock_key: RedisKey,
    /// TTL of this process's availability snapshot.
    pub cache_ttl: CacheTtlMs,
    /// Expiry of the distributed lock. Bounds how long a crashed holder blocks others.
    pub lock_ttl: Duration,
    /// Lock acquisition attempts before giving up with [`VacancyError::LockUnavailable`].
    pub lock_attempts: u32,
    /// Base of the exponential backoff between lock attempts.
    pub lock_backoff: Duration,
    /// Upper bound of the random jitter added to each backoff.
    pub lock_max_jitter: Duration,
    /// Read-check-write rounds allowed while holding the lock before giving up
    /// with [`VacancyError::TransactionConflict`].
    pub max_transaction_retries: u32,
}

impl Default for DistributedCounterOptions {
    fn default() -> Self {
        Self {
            prefix: RedisKey::default_prefix(),
            stock_key: RedisKey::default_stock_key(),
            cache_ttl: CacheTtlMs::default(),
            lock_ttl: Duration::from_secs(5),
            lock_attempts: 5,
            lock_backoff: Duration::from_millis(10),
            lock_max_jitter: Duration::from_millis(10),
            max_transaction_retries: 16,
        }
    }
}

/// Stock counter shared by every process that points at the same store keys.
///
/// # Algorithm
///
/// 1. **Validate:** `qty <= 0` is rejected with [`VacancyError::InvalidQuantity`]
/// 2. **Lock:** `SET <prefix>:<stock>:lock <token> NX PX <lock_ttl>`, retried with
///    exponential backoff and jitter (see [`lock_retry_delay`](crate::lock_retry_delay))
/// 3. **Read-check-write:** read the stock (missing reads as 0). If it is short,
///    stop. Otherwise write `current - qty` only if the key still holds
///    `current`. A rejected write re-runs this step without re-locking.
/// 4. **Release:** delete the lock only if it still holds our token, whatever
///    happened in step 3
///
/// The lock serializes well-behaved holders; the conditional write catches a
/// writer that slipped in after our lock expired. Together they guarantee the
/// stored value never goes below zero.
///
/// # Failure
///
/// Store errors surface as [`VacancyError::BackendUnavailable`] or
/// [`VacancyError::BackendTimeout`]. [`HybridCounter`](crate::HybridCounter)
/// turns these into a switch to its in-process fallback.
pub struct DistributedCounter<S: SharedStore = RedisStore> {
    store: S,
    keys: StockKeys,
    lock_timing: LockTiming,
    max_transaction_retries: u32,
    cache: ReadCache,
    last_observed: AtomicU64,
}

impl<S: SharedStore> DistributedCounter<S> {
    /// Create a counter over `store`. Does not touch the store.
    pub fn new(store: S, options: DistributedCounterOptions) -> Self {
        Self {
            store,
            keys: StockKeys::new(&options.prefix, &options.stock_key),
            lock_timing: LockTiming {
                ttl: options.lock_ttl,
                attempts: options.lock_attempts,
                backoff: options.lock_backoff,
                max_jitter: options.lock_max_jitter,
            },
            max_transaction_retries: options.max_transaction_retries,
            cache: ReadCache::new(options.cache_ttl.as_duration()),
            last_observed: AtomicU64::new(NOT_OBSERVED),
        }
    } // end constructor

    /// Reserve `qty` units across every process sharing the store.
    pub async fn reserve(&self, qty: i64) -> Result<Reservation, VacancyError> {
        let qty = Quantity::try_from(qty)?;

        let lock = StockLock::acquire(&self.store, &self.keys.lock, &self.lock_timing).await?;
        let result = self.decrement_locked(*qty).await;
        lock.release().await;

        match &result {
            Ok(reservation) if reservation.success => self.cache.invalidate(),
            Ok(_) => {}
            Err(err) => {
                tracing::error!(key = &*self.keys.stock, error = %err, "redis.reserve.error");
            }
        }

        result
    } // end method reserve

    async fn decrement_locked(&self, qty: u64) -> Result<Reservation, VacancyError> {
        let attempts = self.max_transaction_retries.max(1);

        for attempt in 0..attempts {
            let current = self.read_stock().await?;

            if current < qty {
                tracing::warn!(
                    key = &*self.keys.stock,
                    qty,
                    remaining = current,
                    "redis.reserve.insufficient"
                );
                return Ok(Reservation::insufficient(current));
            }

            let remaining = current - qty;

            if self
                .store
                .compare_and_set(&self.keys.stock, to_stored(current)?, to_stored(remaining)?)
                .await?
            {
                self.last_observed.store(remaining, Ordering::Relaxed);
                return Ok(Reservation::reserved(remaining));
            }

            tracing::debug!(key = &*self.keys.stock, attempt, "redis.reserve.conflict");
        }

        Err(VacancyError::TransactionConflict { attempts })
    } // end method decrement_locked

    /// Current quantity in the store.
    ///
    /// With `use_cache`, an unexpired snapshot held by this process is returned
    /// without a round-trip.
    pub async fn get_current(&self, use_cache: bool) -> Result<u64, VacancyError> {
        if use_cache {
            if let Some(cached) = self.cache.get() {
                return Ok(cached);
            }
        }

        let generation = self.cache.generation();
        let current = self.read_stock().await?;
        self.cache.fill(current, generation);

        Ok(current)
    } // end method get_current

    /// Seed the stock with `initial` unless another process already did.
    ///
    /// Returns `true` if this call wrote the value.
    pub async fn initialize_stock(&self, initial: u64) -> Result<bool, VacancyError> {
        let value = i64::try_from(initial).map_err(|_| {
            VacancyError::InvalidConfig(format!("initial stock {initial} does not fit in i64"))
        })?;

        let seeded = self.store.set_if_absent(&self.keys.stock, value).await?;
        self.cache.invalidate();

        if seeded {
            self.last_observed.store(initial, Ordering::Relaxed);
            tracing::info!(key = &*self.keys.stock, initial, "redis.stock.seeded");
        } else {
            tracing::info!(key = &*self.keys.stock, "redis.stock.exists");
        }

        Ok(seeded)
    } // end method initialize_stock

    /// Add `amount` units to the shared stock and return the new quantity.
    pub async fn restock(&self, amount: i64) -> Result<u64, VacancyError> {
        let amount = Quantity::try_from(amount)?;

        let raw = self
            .store
            .increment(&self.keys.stock, to_stored(*amount)?)
            .await?;
        self.cache.invalidate();

        let new_total = self.observe(Some(raw))?;
        tracing::info!(key = &*self.keys.stock, amount = *amount, new_total, "redis.restock");

        Ok(new_total)
    } // end method restock

    /// Ping the store and read the stock, without going through the cache.
    pub async fn store_health(&self) -> StoreHealth {
        let endpoint = self.store.endpoint();

        if let Err(err) = self.store.ping().await {
            return StoreHealth {
                reachable: false,
                current_stock: None,
                endpoint,
                error: Some(err.to_string()),
            };
        }

        match self.read_stock().await {
            Ok(current) => StoreHealth {
                reachable: true,
                current_stock: Some(current),
                endpoint,
                error: None,
            },
            Err(err) => StoreHealth {
                reachable: true,
                current_stock: None,
                endpoint,
                error: Some(err.to_string()),
            },
        }
    } // end method store_health

    /// Last stock value this instance read from or wrote to the store.
    pub fn last_observed(&self) -> Option<u64> {
        match self.last_observed.load(Ordering::Relaxed) {
            NOT_OBSERVED => None,
            value => Some(value),
        }
    }

    /// Fully qualified key holding the stock.
    pub fn stock_key(&self) -> &str {
        &self.keys.stock
    }

    /// Fully qualified key of the distributed lock.
    pub fn lock_key(&self) -> &str {
        &self.keys.lock
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    async fn read_stock(&self) -> Result<u64, VacancyError> {
        let raw = self.store.get(&self.keys.stock).await?;
        self.observe(raw)
    }

    fn observe(&self, raw: Option<i64>) -> Result<u64, VacancyError> {
        let value = match raw {
            None => 0,
            Some(value) => u64::try_from(value).map_err(|_| {
                VacancyError::InvalidStoredValue(format!(
                    "{} holds negative stock {value}",
                    &*self.keys.stock
                ))
            })?,
        };

        self.last_observed.store(value, Ordering::Relaxed);

        Ok(value)
    }
} // end impl DistributedCounter

fn to_stored(value: u64) -> Result<i64, VacancyError> {
    i64::try_from(value)
        .map_err(|_| VacancyError::InvalidStoredValue(format!("{value} does not fit in i64")))
}

impl<S: SharedStore> StockCounter for DistributedCounter<S> {
    async fn reserve(&self, qty: i64) -> Result<Reservation, VacancyError> {
        DistributedCounter::reserve(self, qty).await
    }

    async fn get_current(&self, use_cache: bool) -> Result<u64, VacancyError> {
        DistributedCounter::get_current(self, use_cache).await
    }

    async fn restock(&self, amount: i64) -> Result<u64, VacancyError> {
        DistributedCounter::restock(self, amount).await
    }

    async fn health_check(&self) -> HealthReport {
        let store = self.store_health().await;

        HealthReport {
            status: if store.reachable {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            backend: BackendKind::Distributed,
            current_stock: store.current_stock.unwrap_or(0),
            mode: None,
            distributed: Some(store),
        }
    }
}
