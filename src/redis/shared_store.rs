use std::{future::Future, time::Duration};

use crate::VacancyError;

/// The capabilities a distributed counter needs from its shared store.
///
/// [`RedisStore`](crate::RedisStore) is the production implementation.
/// Implementations must bound every call in time and report transport problems
/// as [`VacancyError::BackendUnavailable`] or [`VacancyError::BackendTimeout`].
pub trait SharedStore: Send + Sync + 'static {
    /// Round-trip to check reachability.
    fn ping(&self) -> impl Future<Output = Result<(), VacancyError>> + Send;

    /// Read an integer key. A missing key is `None`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<i64>, VacancyError>> + Send;

    /// Write `value` only if `key` does not exist yet. Returns whether it wrote.
    fn set_if_absent(
        &self,
        key: &str,
        value: i64,
    ) -> impl Future<Output = Result<bool, VacancyError>> + Send;

    /// Write `new` only if `key` still holds `expected` (a missing key reads as 0).
    ///
    /// This is the optimistic conditional write: `false` means another writer
    /// changed the value since it was read.
    fn compare_and_set(
        &self,
        key: &str,
        expected: i64,
        new: i64,
    ) -> impl Future<Output = Result<bool, VacancyError>> + Send;

    /// Add `amount` to an integer key and return the new value.
    fn increment(
        &self,
        key: &str,
        amount: i64,
    ) -> impl Future<Output = Result<i64, VacancyError>> + Send;

    /// Create the lock `key` holding `token` with expiry `ttl`, if it is free.
    fn acquire_lock(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool, VacancyError>> + Send;

    /// Delete the lock `key` only if it still holds `token`.
    ///
    /// Returns `false` when the lock had already expired or belongs to someone else.
    fn release_lock(
        &self,
        key: &str,
        token: &str,
    ) -> impl Future<Output = Result<bool, VacancyError>> + Send;

    /// Store endpoint with credentials stripped.
    fn endpoint(&self) -> String;
}
