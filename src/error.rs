/// Error type for this crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VacancyError {
    /// Requested quantity was zero or negative.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(i64),

    /// Every distributed lock acquisition attempt failed.
    #[error("could not acquire distributed stock lock after {attempts} attempts")]
    LockUnavailable {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// The shared store could not be reached or rejected a command.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A shared store call exceeded its time bound.
    #[error("backend timeout: {operation} took longer than {timeout_ms}ms")]
    BackendTimeout {
        /// Store operation that timed out.
        operation: &'static str,
        /// Bound that was exceeded.
        timeout_ms: u64,
    },

    /// The conditional write kept losing to concurrent writers.
    #[error("stock transaction conflicted {attempts} times in a row")]
    TransactionConflict {
        /// Number of read-check-write rounds attempted.
        attempts: u32,
    },

    /// The shared store holds something that is not a non-negative stock count.
    #[error("invalid stored stock value: {0}")]
    InvalidStoredValue(String),

    /// Redis key segment failed validation.
    #[error("invalid redis key: {0}")]
    InvalidRedisKey(String),

    /// Redis connection pool size failed validation.
    #[error("invalid redis client connection count: {0}")]
    InvalidRedisClientConnectionCount(String),

    /// Configuration value could not be parsed or was out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl VacancyError {
    /// Whether this error came from talking to the shared store.
    ///
    /// These are the failures that demote a hybrid counter to its in-process
    /// fallback. Caller mistakes such as [`VacancyError::InvalidQuantity`] are not.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Self::LockUnavailable { .. }
                | Self::BackendUnavailable(_)
                | Self::BackendTimeout { .. }
                | Self::TransactionConflict { .. }
                | Self::InvalidStoredValue(_)
        )
    }
}

#[cfg(feature = "redis-tokio")]
impl From<redis::RedisError> for VacancyError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::TypeError => Self::InvalidStoredValue(err.to_string()),
            _ => Self::BackendUnavailable(err.to_string()),
        }
    }
}
