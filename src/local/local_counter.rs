use parking_lot::Mutex;

use crate::{
    BackendKind, CacheTtlMs, HealthReport, HealthStatus, Quantity, Reservation, StockCounter,
    VacancyError, read_cache::ReadCache,
};

/// Stock counter that lives entirely inside the current process.
///
/// # Algorithm
///
/// 1. **Validate:** `qty <= 0` is rejected with [`VacancyError::InvalidQuantity`]
/// 2. **Exclusive section:** take the counter mutex
/// 3. **Decide:** if `current >= qty`, decrement and invalidate the read cache,
///    otherwise leave the count untouched
/// 4. **Release:** drop the mutex and report `(success, remaining)`
///
/// # Concurrency
///
/// The exclusive section is a synchronous [`parking_lot::Mutex`]. It is held only
/// for the read-check-write of one integer and can never be held across an
/// `.await`, so two reservations can never observe the same pre-decrement value
/// whether the caller runs on one thread or many.
///
/// # Read cache
///
/// [`LocalCounter::get_current`] with `use_cache = true` answers from a snapshot
/// that is at most one TTL old and does not touch the exclusive section. Every
/// successful write invalidates the snapshot, so a reservation is always visible
/// to the next read. Reservations never consult the snapshot.
///
/// # Examples
///
/// ```
/// use vacancy::{CacheTtlMs, LocalCounter};
///
/// let counter = LocalCounter::new(1000, CacheTtlMs::default());
///
/// let first = counter.reserve(500).unwrap();
/// assert!(first.success);
/// assert_eq!(first.remaining, 500);
///
/// let second = counter.reserve(600).unwrap();
/// assert!(!second.success);
/// assert_eq!(second.remaining, 500);
/// ```
pub struct LocalCounter {
    total: Mutex<u64>,
    cache: ReadCache,
}

impl LocalCounter {
    /// Create a counter holding `initial_stock` units.
    pub fn new(initial_stock: u64, cache_ttl: CacheTtlMs) -> Self {
        Self {
            total: Mutex::new(initial_stock),
            cache: ReadCache::new(cache_ttl.as_duration()),
        }
    } // end constructor

    /// Reserve `qty` units if that many remain.
    ///
    /// Returns `success == false` with the untouched quantity when stock is short.
    pub fn reserve(&self, qty: i64) -> Result<Reservation, VacancyError> {
        let qty = Quantity::try_from(qty)?;

        let mut total = self.total.lock();

        if *total >= *qty {
            *total -= *qty;
            self.cache.invalidate();

            return Ok(Reservation::reserved(*total));
        }

        let remaining = *total;
        drop(total);

        tracing::warn!(qty = *qty, remaining, "local.reserve.insufficient");

        Ok(Reservation::insufficient(remaining))
    } // end method reserve

    /// Current quantity.
    ///
    /// With `use_cache`, an unexpired snapshot is returned without taking the
    /// exclusive section. Otherwise the authoritative value is read and the
    /// snapshot refreshed.
    pub fn get_current(&self, use_cache: bool) -> u64 {
        if use_cache {
            if let Some(cached) = self.cache.get() {
                return cached;
            }
        }

        let total = self.total.lock();
        let generation = self.cache.generation();
        self.cache.fill(*total, generation);

        *total
    } // end method get_current

    /// Add `amount` units back to the stock and return the new quantity.
    pub fn restock(&self, amount: i64) -> Result<u64, VacancyError> {
        let amount = Quantity::try_from(amount)?;

        let mut total = self.total.lock();
        *total = total.saturating_add(*amount);
        self.cache.invalidate();

        let new_total = *total;
        drop(total);

        tracing::info!(amount = *amount, new_total, "local.restock");

        Ok(new_total)
    } // end method restock
} // end of impl

impl StockCounter for LocalCounter {
    async fn reserve(&self, qty: i64) -> Result<Reservation, VacancyError> {
        LocalCounter::reserve(self, qty)
    }

    async fn get_current(&self, use_cache: bool) -> Result<u64, VacancyError> {
        Ok(LocalCounter::get_current(self, use_cache))
    }

    async fn restock(&self, amount: i64) -> Result<u64, VacancyError> {
        LocalCounter::restock(self, amount)
    }

    async fn health_check(&self) -> HealthReport {
        HealthReport {
            status: HealthStatus::Healthy,
            backend: BackendKind::InMemory,
            current_stock: LocalCounter::get_current(self, false),
            mode: None,
            distributed: None,
        }
    }
}
