use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::sync::RwLock;

use crate::{
    BackendKind, CacheTtlMs, CounterMode, DistributedCounter, HealthReport, HealthStatus,
    HybridCounterOptions, LocalCounter, Quantity, RedisStore, Reservation, SharedStore,
    StockCounter, StoreHealth, VacancyError, hybrid::init_retry_delay, runtime,
};

enum ActiveBackend<S: SharedStore> {
    Distributed(Arc<DistributedCounter<S>>),
    Fallback {
        local: Arc<LocalCounter>,
        /// Store detail captured when the counter switched over.
        store: Option<StoreHealth>,
    },
}

/// Stock counter that prefers the shared store and survives losing it.
///
/// # Modes
///
/// - **`DistributedActive`:** every call goes to the [`DistributedCounter`]
/// - **`FallbackActive`:** every call goes to an in-process [`LocalCounter`]
///
/// The only transition is `DistributedActive -> FallbackActive`. It happens
/// when initialization cannot reach the store, or the first time a distributed
/// call fails with a backend error (see [`VacancyError::is_backend_failure`]).
/// The call that triggered it is then served by the fallback, so callers never
/// see store outages. Returning to the store requires a new counter.
///
/// # Seeding the fallback
///
/// 1. One fresh read of the store, if it still answers
/// 2. Otherwise the last stock value this instance observed in the store
/// 3. Otherwise `initial_stock`
///
/// Distributed calls hold the read side of the mode lock until they finish.
/// Demotion takes the write side, so it waits for every in-flight store call
/// of this instance (each one bounded by the store's command timeout) before
/// reading the seed. No reservation can commit to the store after the seed is
/// read, and the first failure to get the write side installs the fallback
/// that all later ones adopt.
pub struct HybridCounter<S: SharedStore = RedisStore> {
    state: RwLock<ActiveBackend<S>>,
    fallback_active: AtomicBool,
    distributed: Option<Arc<DistributedCounter<S>>>,
    initial_stock: u64,
    cache_ttl: CacheTtlMs,
}

impl HybridCounter<RedisStore> {
    /// Connect to `options.redis_url`, seed the stock and start in distributed mode.
    ///
    /// Without a URL, or when every attempt fails, the counter starts in
    /// fallback mode holding `options.initial_stock`. This never fails.
    pub async fn initialize(options: HybridCounterOptions) -> Self {
        let Some(url) = options.redis_url.clone() else {
            tracing::info!(
                initial_stock = options.initial_stock,
                "hybrid.init.no_store_configured"
            );
            return Self::fallback_only(options.initial_stock, options.counter.cache_ttl);
        };

        let store_options = options.store.clone();

        Self::initialize_with(options, move || {
            let url = url.clone();
            let store_options = store_options.clone();
            async move { RedisStore::connect(&url, &store_options).await }
        })
        .await
    } // end method initialize

    /// Start directly in fallback mode.
    pub fn in_memory(initial_stock: u64, cache_ttl: CacheTtlMs) -> Self {
        Self::fallback_only(initial_stock, cache_ttl)
    }
}

impl<S: SharedStore> HybridCounter<S> {
    /// Run the initialization cycle over stores produced by `connect`.
    ///
    /// Each attempt connects, pings and seeds the stock (first writer wins).
    /// Failed attempts are retried after
    /// [`init_retry_delay`](crate::init_retry_delay).
    pub async fn initialize_with<F, Fut>(options: HybridCounterOptions, mut connect: F) -> Self
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<S, VacancyError>>,
    {
        let attempts = options.init_attempts.max(1);

        for attempt in 0..attempts {
            match Self::try_distributed(&options, &mut connect).await {
                Ok(distributed) => {
                    tracing::info!(
                        key = distributed.stock_key(),
                        endpoint = %distributed.store().endpoint(),
                        "hybrid.init.distributed"
                    );
                    return Self::with_distributed(
                        distributed,
                        options.initial_stock,
                        options.counter.cache_ttl,
                    );
                }
                Err(err) => {
                    tracing::warn!(attempt, attempts, error = %err, "hybrid.init.attempt_failed");
                }
            }

            if attempt + 1 < attempts {
                runtime::sleep(init_retry_delay(
                    attempt,
                    options.init_backoff,
                    options.init_backoff_multiplier,
                ))
                .await;
            }
        }

        tracing::error!(
            attempts,
            initial_stock = options.initial_stock,
            "hybrid.init.fallback"
        );

        Self::fallback_only(options.initial_stock, options.counter.cache_ttl)
    } // end method initialize_with

    async fn try_distributed<F, Fut>(
        options: &HybridCounterOptions,
        connect: &mut F,
    ) -> Result<DistributedCounter<S>, VacancyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<S, VacancyError>>,
    {
        let store = connect().await?;
        store.ping().await?;

        let distributed = DistributedCounter::new(store, options.counter.clone());
        distributed.initialize_stock(options.initial_stock).await?;

        Ok(distributed)
    }

    /// Start in distributed mode over an already initialized counter.
    pub fn with_distributed(
        distributed: DistributedCounter<S>,
        initial_stock: u64,
        cache_ttl: CacheTtlMs,
    ) -> Self {
        let distributed = Arc::new(distributed);

        Self {
            state: RwLock::new(ActiveBackend::Distributed(distributed.clone())),
            fallback_active: AtomicBool::new(false),
            distributed: Some(distributed),
            initial_stock,
            cache_ttl,
        }
    }

    fn fallback_only(initial_stock: u64, cache_ttl: CacheTtlMs) -> Self {
        Self {
            state: RwLock::new(ActiveBackend::Fallback {
                local: Arc::new(LocalCounter::new(initial_stock, cache_ttl)),
                store: None,
            }),
            fallback_active: AtomicBool::new(true),
            distributed: None,
            initial_stock,
            cache_ttl,
        }
    }

    /// Reserve `qty` units from whichever backend is active.
    pub async fn reserve(&self, qty: i64) -> Result<Reservation, VacancyError> {
        Quantity::try_from(qty)?;

        let state = self.state.read().await;
        let distributed = match &*state {
            ActiveBackend::Fallback { local, .. } => return local.reserve(qty),
            ActiveBackend::Distributed(distributed) => distributed.clone(),
        };

        let result = distributed.reserve(qty).await;
        drop(state);

        match result {
            Err(err) if err.is_backend_failure() => {
                self.demote(&distributed, &err).await.reserve(qty)
            }
            result => result,
        }
    } // end method reserve

    /// Current stock from whichever backend is active.
    pub async fn get_current(&self, use_cache: bool) -> Result<u64, VacancyError> {
        let state = self.state.read().await;
        let distributed = match &*state {
            ActiveBackend::Fallback { local, .. } => return Ok(local.get_current(use_cache)),
            ActiveBackend::Distributed(distributed) => distributed.clone(),
        };

        let result = distributed.get_current(use_cache).await;
        drop(state);

        match result {
            Err(err) if err.is_backend_failure() => {
                Ok(self.demote(&distributed, &err).await.get_current(use_cache))
            }
            result => result,
        }
    } // end method get_current

    /// Add `amount` units to whichever backend is active.
    pub async fn restock(&self, amount: i64) -> Result<u64, VacancyError> {
        Quantity::try_from(amount)?;

        let state = self.state.read().await;
        let distributed = match &*state {
            ActiveBackend::Fallback { local, .. } => return local.restock(amount),
            ActiveBackend::Distributed(distributed) => distributed.clone(),
        };

        let result = distributed.restock(amount).await;
        drop(state);

        match result {
            Err(err) if err.is_backend_failure() => {
                self.demote(&distributed, &err).await.restock(amount)
            }
            result => result,
        }
    } // end method restock

    /// Current operating mode.
    pub fn mode(&self) -> CounterMode {
        if self.fallback_active.load(Ordering::Acquire) {
            CounterMode::FallbackActive
        } else {
            CounterMode::DistributedActive
        }
    }

    /// Whether the shared store is still authoritative.
    pub fn is_distributed(&self) -> bool {
        self.mode() == CounterMode::DistributedActive
    }

    /// The distributed counter, if initialization reached the store.
    ///
    /// Still available after demotion, for diagnostics.
    pub fn distributed(&self) -> Option<&DistributedCounter<S>> {
        self.distributed.as_deref()
    }

    /// Mode, stock and store detail for a readiness probe.
    ///
    /// Unhealthy only while distributed mode is active and the store does not
    /// answer. In fallback mode the report carries the store detail captured at
    /// demotion and makes no store calls.
    pub async fn health_check(&self) -> HealthReport {
        let distributed = match &*self.state.read().await {
            ActiveBackend::Fallback { local, store } => {
                return HealthReport {
                    status: HealthStatus::Healthy,
                    backend: BackendKind::InMemory,
                    current_stock: local.get_current(false),
                    mode: Some(CounterMode::FallbackActive),
                    distributed: store.clone(),
                };
            }
            ActiveBackend::Distributed(distributed) => distributed.clone(),
        };

        let store = distributed.store_health().await;

        HealthReport {
            status: if store.reachable {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            backend: BackendKind::Distributed,
            current_stock: store
                .current_stock
                .or_else(|| distributed.last_observed())
                .unwrap_or(0),
            mode: Some(CounterMode::DistributedActive),
            distributed: Some(store),
        }
    } // end method health_check

    /// Switch to fallback mode (once) and return the fallback counter.
    ///
    /// The caller must not hold the mode lock.
    async fn demote(
        &self,
        distributed: &DistributedCounter<S>,
        cause: &VacancyError,
    ) -> Arc<LocalCounter> {
        let mut state = self.state.write().await;

        if let ActiveBackend::Fallback { local, .. } = &*state {
            return local.clone();
        }

        let endpoint = distributed.store().endpoint();
        let (seed, store) = match distributed.get_current(false).await {
            Ok(current) => (
                current,
                StoreHealth {
                    reachable: true,
                    current_stock: Some(current),
                    endpoint,
                    error: Some(cause.to_string()),
                },
            ),
            Err(err) => {
                let seed = distributed
                    .last_observed()
                    .unwrap_or(self.initial_stock);
                tracing::debug!(error = %err, seed, "hybrid.demote.seed_read_failed");

                let reachable = !matches!(
                    err,
                    VacancyError::BackendUnavailable(_) | VacancyError::BackendTimeout { .. }
                );
                (
                    seed,
                    StoreHealth {
                        reachable,
                        current_stock: None,
                        endpoint,
                        error: Some(err.to_string()),
                    },
                )
            }
        };

        let local = Arc::new(LocalCounter::new(seed, self.cache_ttl));
        *state = ActiveBackend::Fallback {
            local: local.clone(),
            store: Some(store),
        };
        self.fallback_active.store(true, Ordering::Release);
        drop(state);

        tracing::warn!(
            cause = %cause,
            seed,
            key = distributed.stock_key(),
            "hybrid.demoted_to_fallback"
        );

        local
    } // end method demote
} // end impl HybridCounter

impl<S: SharedStore> StockCounter for HybridCounter<S> {
    async fn reserve(&self, qty: i64) -> Result<Reservation, VacancyError> {
        HybridCounter::reserve(self, qty).await
    }

    async fn get_current(&self, use_cache: bool) -> Result<u64, VacancyError> {
        HybridCounter::get_current(self, use_cache).await
    }

    async fn restock(&self, amount: i64) -> Result<u64, VacancyError> {
        HybridCounter::restock(self, amount).await
    }

    async fn health_check(&self) -> HealthReport {
        HybridCounter::health_check(self).await
    }
}
