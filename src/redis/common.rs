use std::{
    fmt,
    ops::Deref,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use redis::{Client, aio::ConnectionManager};

use crate::VacancyError;

/// A small round-robin pool of [`redis::aio::ConnectionManager`]s.
///
/// Each manager multiplexes commands over one connection and reconnects on its
/// own; spreading calls over several of them keeps one slow reply from stalling
/// every reservation in the process.
pub struct VacancyRedisClient {
    connection_managers: Arc<Vec<ConnectionManager>>,
    track_index: AtomicUsize,
}

impl VacancyRedisClient {
    /// Create a client with `connection_count` connection managers.
    pub async fn from_client(
        client: Client,
        connection_count: usize,
    ) -> Result<Self, VacancyError> {
        if connection_count == 0 {
            return Err(VacancyError::InvalidRedisClientConnectionCount(
                "connection count must be > 0".to_string(),
            ));
        }

        let mut connection_managers = Vec::with_capacity(connection_count);

        for _ in 0..connection_count {
            connection_managers.push(client.get_connection_manager().await?);
        }

        Ok(Self {
            connection_managers: Arc::new(connection_managers),
            track_index: AtomicUsize::new(0),
        })
    }

    /// Next connection manager in round-robin order.
    pub(crate) fn get(&self) -> ConnectionManager {
        let index = self.track_index.fetch_add(1, Ordering::Relaxed);
        self.connection_managers[index % self.connection_managers.len()].clone()
    } // end method get

    /// Number of pooled connection managers.
    pub fn connection_count(&self) -> usize {
        self.connection_managers.len()
    }
} // end impl VacancyRedisClient

impl fmt::Debug for VacancyRedisClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VacancyRedisClient")
            .field("connection_count", &self.connection_managers.len())
            .finish()
    }
}

impl Clone for VacancyRedisClient {
    fn clone(&self) -> Self {
        Self {
            connection_managers: self.connection_managers.clone(),
            track_index: AtomicUsize::new(0),
        }
    }
}

/// A validated segment of a Redis key.
///
/// This is a string with the following constraints:
/// - Must not be empty
/// - Must not be longer than 255 bytes
/// - Must not contain colons (they separate segments)
#[derive(Debug, Clone, PartialEq, PartialOrd, Hash, Eq)]
pub struct RedisKey(Arc<str>);

impl RedisKey {
    /// Default namespace for every key this crate writes.
    pub fn default_prefix() -> Self {
        Self(Arc::from("vacancy"))
    }

    /// Default identifier of the stock counter.
    pub fn default_stock_key() -> Self {
        Self(Arc::from("ticket_stock"))
    }
}

impl Deref for RedisKey {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<String> for RedisKey {
    type Error = VacancyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(VacancyError::InvalidRedisKey(
                "Redis key must not be empty".to_string(),
            ))
        } else if value.len() > 255 {
            Err(VacancyError::InvalidRedisKey(
                "Redis key must not be longer than 255 characters".to_string(),
            ))
        } else if value.contains(':') {
            Err(VacancyError::InvalidRedisKey(
                "Redis key must not contain colons".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

impl TryFrom<&str> for RedisKey {
    type Error = VacancyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

/// Fully qualified keys for one stock counter.
///
/// - `<prefix>:<stock>` holds the integer quantity
/// - `<prefix>:<stock>:lock` holds the holder token while a reservation runs
#[derive(Clone, Debug)]
pub(crate) struct StockKeys {
    pub stock: Arc<str>,
    pub lock: Arc<str>,
}

impl StockKeys {
    pub(crate) fn new(prefix: &RedisKey, stock: &RedisKey) -> Self {
        let stock_key = format!("{}:{}", &**prefix, &**stock);
        let lock_key = format!("{stock_key}:lock");

        Self {
            stock: Arc::from(stock_key),
            lock: Arc::from(lock_key),
        }
    }
}

/// Strip credentials from a connection URL so it can be logged or reported.
pub(crate) fn redact_endpoint(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => {
            let host = rest.rsplit('@').next().unwrap_or(rest);
            format!("{scheme}://{host}")
        }
        None => url.rsplit('@').next().unwrap_or(url).to_string(),
    }
}
