use std::sync::Arc;

use serde::Serialize;

use crate::{HealthReport, StockCounter, VacancyError};

/// Result of [`StockService::reserve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReserveOutcome {
    /// Whether the tickets were reserved.
    pub success: bool,
    /// Stock left after the attempt.
    pub remaining: u64,
    /// Human-readable summary.
    pub message: String,
}

/// Result of [`StockService::get_available`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Availability {
    /// Tickets currently available. May be up to one cache TTL old.
    pub qty: u64,
}

/// Request-facing facade over a shared stock counter.
///
/// The service holds only an [`Arc`] to the counter, so clones are cheap and
/// every clone sells from the same stock.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use vacancy::{CacheTtlMs, LocalCounter, StockService};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let service = StockService::new(Arc::new(LocalCounter::new(5, CacheTtlMs::default())));
///
/// let outcome = service.reserve(2).await.unwrap();
/// assert_eq!(outcome.message, "Reserved 2 tickets");
/// assert_eq!(service.get_available().await.unwrap().qty, 3);
/// # });
/// ```
pub struct StockService<C: StockCounter> {
    counter: Arc<C>,
}

impl<C: StockCounter> Clone for StockService<C> {
    fn clone(&self) -> Self {
        Self {
            counter: self.counter.clone(),
        }
    }
}

impl<C: StockCounter> StockService<C> {
    /// Create a service selling from `counter`.
    pub fn new(counter: Arc<C>) -> Self {
        Self { counter }
    }

    /// The counter behind this service.
    pub fn counter(&self) -> &Arc<C> {
        &self.counter
    }

    /// Reserve `qty` tickets.
    ///
    /// Running out of stock is a normal outcome (`success == false`), not an error.
    pub async fn reserve(&self, qty: i64) -> Result<ReserveOutcome, VacancyError> {
        let reservation = self.counter.reserve(qty).await?;

        let message = if reservation.success {
            format!("Reserved {qty} tickets")
        } else {
            "Insufficient inventory".to_string()
        };

        Ok(ReserveOutcome {
            success: reservation.success,
            remaining: reservation.remaining,
            message,
        })
    } // end method reserve

    /// Tickets currently available, served from the read cache when possible.
    pub async fn get_available(&self) -> Result<Availability, VacancyError> {
        let qty = self.counter.get_current(true).await?;

        Ok(Availability { qty })
    }

    /// Add `amount` tickets back to the stock.
    pub async fn restock(&self, amount: i64) -> Result<u64, VacancyError> {
        self.counter.restock(amount).await
    }

    /// Readiness snapshot of the counter.
    pub async fn health_check(&self) -> HealthReport {
        self.counter.health_check().await
    }
}
