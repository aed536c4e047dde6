use std::{fmt, time::Duration};

use redis::{AsyncCommands, Script};

use crate::{
    VacancyError,
    redis::{SharedStore, VacancyRedisClient, redact_endpoint},
    runtime,
};

const COMPARE_AND_SET_SCRIPT: &str = r#"
    local stock_key = KEYS[1]

    local expected = tonumber(ARGV[1])
    local new_value = ARGV[2]

    local current = tonumber(redis.call("GET", stock_key) or "0")
    if current == nil then
        return -1
    end

    if current ~= expected then
        return 0
    end

    redis.call("SET", stock_key, new_value)
    return 1
"#;

const RELEASE_LOCK_SCRIPT: &str = r#"
    local lock_key = KEYS[1]
    local token = ARGV[1]

    if redis.call("GET", lock_key) == token then
        return redis.call("DEL", lock_key)
    end

    return 0
"#;

/// Connection settings for [`RedisStore`].
#[derive(Clone, Debug)]
pub struct RedisStoreOptions {
    /// Upper bound for every individual command.
    pub command_timeout: Duration,
    /// Upper bound for establishing the connection pool.
    pub connect_timeout: Duration,
    /// Number of pooled connection managers. Must be > 0.
    pub connection_count: usize,
}

impl Default for RedisStoreOptions {
    /// 2 s per command, 5 s to connect, 4 connections.
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(5),
            connection_count: 4,
        }
    }
}

/// [`SharedStore`] backed by Redis.
///
/// Plain commands cover reads, `SET NX`, `INCRBY` and lock acquisition
/// (`SET key token NX PX ttl`). Two Lua scripts cover the operations that must
/// be atomic on the server:
///
/// - **compare-and-set:** writes the new stock value only if the key still holds
///   the value the caller read, the same guarantee a `WATCH`/`MULTI`/`EXEC`
///   transaction gives, without needing a dedicated connection
/// - **release:** deletes the lock only if it still holds the caller's token, so a
///   holder whose lock expired can never delete its successor's lock
///
/// Every command is bounded by [`RedisStoreOptions::command_timeout`].
#[derive(Clone)]
pub struct RedisStore {
    client: VacancyRedisClient,
    command_timeout: Duration,
    endpoint: String,
    compare_and_set_script: Script,
    release_lock_script: Script,
}

impl RedisStore {
    /// Open a connection pool to `url`.
    pub async fn connect(url: &str, options: &RedisStoreOptions) -> Result<Self, VacancyError> {
        let endpoint = redact_endpoint(url);
        tracing::info!(endpoint = %endpoint, "redis.connect");

        let client = redis::Client::open(url)?;
        let client = runtime::with_timeout(
            "connect",
            options.connect_timeout,
            VacancyRedisClient::from_client(client, options.connection_count),
        )
        .await?;

        Ok(Self::from_client(client, endpoint, options.command_timeout))
    } // end method connect

    /// Wrap an already connected client.
    pub fn from_client(
        client: VacancyRedisClient,
        endpoint: String,
        command_timeout: Duration,
    ) -> Self {
        Self {
            client,
            command_timeout,
            endpoint,
            compare_and_set_script: Script::new(COMPARE_AND_SET_SCRIPT),
            release_lock_script: Script::new(RELEASE_LOCK_SCRIPT),
        }
    }
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("endpoint", &self.endpoint)
            .field("command_timeout", &self.command_timeout)
            .field("client", &self.client)
            .finish()
    }
}

impl SharedStore for RedisStore {
    async fn ping(&self) -> Result<(), VacancyError> {
        let mut connection_manager = self.client.get();

        runtime::with_timeout("ping", self.command_timeout, async move {
            let _: () = redis::cmd("PING")
                .query_async(&mut connection_manager)
                .await?;
            Ok::<_, VacancyError>(())
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, VacancyError> {
        let mut connection_manager = self.client.get();

        runtime::with_timeout("get", self.command_timeout, async move {
            let value: Option<i64> = connection_manager.get(key).await?;
            Ok::<_, VacancyError>(value)
        })
        .await
    }

    async fn set_if_absent(&self, key: &str, value: i64) -> Result<bool, VacancyError> {
        let mut connection_manager = self.client.get();

        runtime::with_timeout("set_if_absent", self.command_timeout, async move {
            let written: bool = connection_manager.set_nx(key, value).await?;
            Ok::<_, VacancyError>(written)
        })
        .await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: i64,
        new: i64,
    ) -> Result<bool, VacancyError> {
        let mut connection_manager = self.client.get();
        let script = &self.compare_and_set_script;

        runtime::with_timeout("compare_and_set", self.command_timeout, async move {
            let written: i64 = script
                .key(key)
                .arg(expected)
                .arg(new)
                .invoke_async(&mut connection_manager)
                .await?;

            match written {
                1 => Ok(true),
                0 => Ok(false),
                _ => Err(VacancyError::InvalidStoredValue(format!(
                    "{key} does not hold an integer"
                ))),
            }
        })
        .await
    }

    async fn increment(&self, key: &str, amount: i64) -> Result<i64, VacancyError> {
        let mut connection_manager = self.client.get();

        runtime::with_timeout("increment", self.command_timeout, async move {
            let value: i64 = connection_manager.incr(key, amount).await?;
            Ok::<_, VacancyError>(value)
        })
        .await
    }

    async fn acquire_lock(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, VacancyError> {
        let mut connection_manager = self.client.get();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        runtime::with_timeout("acquire_lock", self.command_timeout, async move {
            let reply: redis::Value = redis::cmd("SET")
                .arg(key)
                .arg(token)
                .arg("NX")
                .arg("PX")
                .arg(ttl_ms)
                .query_async(&mut connection_manager)
                .await?;
            Ok::<_, VacancyError>(!matches!(reply, redis::Value::Nil))
        })
        .await
    }

    async fn release_lock(&self, key: &str, token: &str) -> Result<bool, VacancyError> {
        let mut connection_manager = self.client.get();
        let script = &self.release_lock_script;

        runtime::with_timeout("release_lock", self.command_timeout, async move {
            let deleted: i64 = script
                .key(key)
                .arg(token)
                .invoke_async(&mut connection_manager)
                .await?;
            Ok::<_, VacancyError>(deleted == 1)
        })
        .await
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}
