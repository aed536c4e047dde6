//! The shape every stock backend satisfies.
//!
//! [`LocalCounter`](crate::LocalCounter) implements it without any runtime. The
//! Redis-backed `DistributedCounter` and the `HybridCounter` that demotes from one
//! to the other are available with the `redis-tokio` feature.

use std::future::Future;

use crate::{HealthReport, Reservation, VacancyError};

/// A single shared stock quantity that can be reserved from.
///
/// # Contract
///
/// - `reserve` fails with [`VacancyError::InvalidQuantity`] for `qty <= 0`.
/// - A successful reservation decrements by exactly `qty` and is immediately
///   visible to the next `get_current` call of the same instance.
/// - An unsuccessful reservation leaves the quantity untouched and reports it.
/// - The quantity is never negative.
pub trait StockCounter: Send + Sync {
    /// Reserve `qty` units if that many remain.
    fn reserve(&self, qty: i64) -> impl Future<Output = Result<Reservation, VacancyError>> + Send;

    /// Current quantity, optionally served from the read cache.
    fn get_current(&self, use_cache: bool)
    -> impl Future<Output = Result<u64, VacancyError>> + Send;

    /// Administrative increment; returns the new quantity.
    ///
    /// Not part of the reservation path.
    fn restock(&self, amount: i64) -> impl Future<Output = Result<u64, VacancyError>> + Send;

    /// Readiness snapshot.
    fn health_check(&self) -> impl Future<Output = HealthReport> + Send;
}
