//! Key-value store port and its Redis connection manager.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{info, instrument};

use super::config::{BackendConfig, redact_address};
use super::error::BackendFailure;

/// A key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Raw bytes stored under `key`, or `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendFailure>;

    /// Store `value`, optionally expiring after `ttl_secs` seconds.
    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>)
    -> Result<(), BackendFailure>;

    /// Remove `key`, returning how many keys were removed.
    async fn delete(&self, key: &str) -> Result<u64, BackendFailure>;

    /// Keys matching a glob-style pattern.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, BackendFailure>;

    /// Release the connection.
    async fn close(&self) -> Result<(), BackendFailure> {
        Ok(())
    }
}

/// A multiplexed, self-reconnecting Redis connection.
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    /// Connect to the server named by the config's URL.
    pub async fn connect(config: &BackendConfig) -> Result<Self, BackendFailure> {
        let client = redis::Client::open(config.address.as_str())
            .map_err(|e| BackendFailure::from_redis(&e))?;
        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| BackendFailure::from_redis(&e))?;

        info!(address = %redact_address(&config.address), "Redis connection ready");
        Ok(Self { connection })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendFailure> {
        let mut con = self.connection.clone();
        let value: Option<Vec<u8>> = con
            .get(key)
            .await
            .map_err(|e| BackendFailure::from_redis(&e))?;
        Ok(value)
    }

    #[instrument(skip(self, value))]
    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> Result<(), BackendFailure> {
        let mut con = self.connection.clone();
        let result: redis::RedisResult<()> = match ttl_secs {
            Some(ttl) => con.set_ex(key, value, ttl).await,
            None => con.set(key, value).await,
        };
        result.map_err(|e| BackendFailure::from_redis(&e))
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<u64, BackendFailure> {
        let mut con = self.connection.clone();
        let removed: u64 = con
            .del(key)
            .await
            .map_err(|e| BackendFailure::from_redis(&e))?;
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, BackendFailure> {
        let mut con = self.connection.clone();
        let keys: Vec<String> = con
            .keys(pattern)
            .await
            .map_err(|e| BackendFailure::from_redis(&e))?;
        Ok(keys)
    }
}
