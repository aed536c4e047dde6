//! Configuration loaded from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `INITIAL_STOCK` | `1000` |
//! | `CACHE_TTL_MS` | `1000` |
//! | `LOG_LEVEL` | `info` |
//! | `REDIS_URL` | unset (in-memory only) |
//! | `REDIS_PREFIX` | `vacancy` |
//! | `REDIS_STOCK_KEY` | `ticket_stock` |
//! | `REDIS_TIMEOUT_MS` | `2000` |
//! | `REDIS_CONNECT_TIMEOUT_MS` | `5000` |
//! | `REDIS_MAX_CONNECTIONS` | `4` |
//! | `REDIS_LOCK_TIMEOUT_MS` | `5000` |
//! | `REDIS_LOCK_ATTEMPTS` | `5` |
//! | `REDIS_INIT_ATTEMPTS` | `5` |
//!
//! Unset or empty variables take the default. A value that does not parse is an
//! error rather than a silent default.

use std::{env, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::VacancyError;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacancyConfig {
    /// Stock seeded into an empty store or fallback counter.
    pub initial_stock: u64,
    /// Availability cache TTL in milliseconds. `0` disables the cache.
    pub cache_ttl_ms: u64,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Shared store settings.
    pub redis: RedisConfig,
}

/// Shared store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL. `None` runs in-memory only.
    pub url: Option<String>,
    /// Key namespace.
    pub prefix: String,
    /// Stock identifier inside the namespace.
    pub stock_key: String,
    /// Per-command timeout in milliseconds.
    pub timeout_ms: u64,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Pooled connections.
    pub max_connections: usize,
    /// Distributed lock expiry in milliseconds.
    pub lock_timeout_ms: u64,
    /// Lock acquisition attempts per reservation.
    pub lock_attempts: u32,
    /// Initialization attempts before starting in fallback mode.
    pub init_attempts: u32,
}

impl Default for VacancyConfig {
    fn default() -> Self {
        Self {
            initial_stock: 1000,
            cache_ttl_ms: 1000,
            log_level: "info".to_string(),
            redis: RedisConfig::default(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            prefix: "vacancy".to_string(),
            stock_key: "ticket_stock".to_string(),
            timeout_ms: 2000,
            connect_timeout_ms: 5000,
            max_connections: 4,
            lock_timeout_ms: 5000,
            lock_attempts: 5,
            init_attempts: 5,
        }
    }
}

impl VacancyConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, VacancyError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, VacancyError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let redis = defaults.redis;

        Ok(Self {
            initial_stock: parse_var(&lookup, "INITIAL_STOCK", defaults.initial_stock)?,
            cache_ttl_ms: parse_var(&lookup, "CACHE_TTL_MS", defaults.cache_ttl_ms)?,
            log_level: string_var(&lookup, "LOG_LEVEL").unwrap_or(defaults.log_level),
            redis: RedisConfig {
                url: string_var(&lookup, "REDIS_URL"),
                prefix: string_var(&lookup, "REDIS_PREFIX").unwrap_or(redis.prefix),
                stock_key: string_var(&lookup, "REDIS_STOCK_KEY").unwrap_or(redis.stock_key),
                timeout_ms: parse_var(&lookup, "REDIS_TIMEOUT_MS", redis.timeout_ms)?,
                connect_timeout_ms: parse_var(
                    &lookup,
                    "REDIS_CONNECT_TIMEOUT_MS",
                    redis.connect_timeout_ms,
                )?,
                max_connections: parse_var(
                    &lookup,
                    "REDIS_MAX_CONNECTIONS",
                    redis.max_connections,
                )?,
                lock_timeout_ms: parse_var(&lookup, "REDIS_LOCK_TIMEOUT_MS", redis.lock_timeout_ms)?,
                lock_attempts: parse_var(&lookup, "REDIS_LOCK_ATTEMPTS", redis.lock_attempts)?,
                init_attempts: parse_var(&lookup, "REDIS_INIT_ATTEMPTS", redis.init_attempts)?,
            },
        })
    } // end method from_lookup

    /// Options for [`HybridCounter::initialize`](crate::HybridCounter::initialize).
    ///
    /// Fails if a key segment or the pool size is invalid.
    #[cfg(feature = "redis-tokio")]
    #[cfg_attr(docsrs, doc(cfg(feature = "redis-tokio")))]
    pub fn hybrid_options(&self) -> Result<crate::HybridCounterOptions, VacancyError> {
        use std::time::Duration;

        use crate::{
            DistributedCounterOptions, HybridCounterOptions, RedisKey, RedisStoreOptions,
        };

        if self.redis.max_connections == 0 {
            return Err(VacancyError::InvalidRedisClientConnectionCount(
                "REDIS_MAX_CONNECTIONS must be > 0".to_string(),
            ));
        }

        Ok(HybridCounterOptions {
            redis_url: self.redis.url.clone(),
            initial_stock: self.initial_stock,
            init_attempts: self.redis.init_attempts,
            store: RedisStoreOptions {
                command_timeout: Duration::from_millis(self.redis.timeout_ms),
                connect_timeout: Duration::from_millis(self.redis.connect_timeout_ms),
                connection_count: self.redis.max_connections,
            },
            counter: DistributedCounterOptions {
                prefix: RedisKey::try_from(self.redis.prefix.as_str())?,
                stock_key: RedisKey::try_from(self.redis.stock_key.as_str())?,
                cache_ttl: self.cache_ttl_ms.into(),
                lock_ttl: Duration::from_millis(self.redis.lock_timeout_ms),
                lock_attempts: self.redis.lock_attempts,
                ..DistributedCounterOptions::default()
            },
            ..HybridCounterOptions::default()
        })
    } // end method hybrid_options
}

fn string_var<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, VacancyError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match string_var(lookup, name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| VacancyError::InvalidConfig(format!("{name}={raw:?} is not valid"))),
    }
}
