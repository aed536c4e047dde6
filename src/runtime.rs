use std::{future::Future, time::Duration};

use crate::VacancyError;

pub(crate) async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Run `fut` with an upper bound, mapping an elapsed bound to
/// [`VacancyError::BackendTimeout`].
pub(crate) async fn with_timeout<F, T>(
    operation: &'static str,
    bound: Duration,
    fut: F,
) -> Result<T, VacancyError>
where
    F: Future<Output = Result<T, VacancyError>>,
{
    match tokio::time::timeout(bound, fut).await {
        Ok(result) => result,
        Err(_elapsed) => Err(VacancyError::BackendTimeout {
            operation,
            timeout_ms: u64::try_from(bound.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
