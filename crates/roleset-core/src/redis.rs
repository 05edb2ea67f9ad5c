//! Redis-backed cache store for distributed deployments.
//!
//! Shares membership cache entries between instances. Reads of many keys go
//! out as a single `MGET`.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::debug;

use crate::config::RedisCacheConfig;
use crate::store::{CacheError, CacheResult, CacheStore};

/// Redis cache store over one multiplexed connection.
///
/// # Example
///
/// ```rust,no_run
/// use roleset_core::config::RedisCacheConfig;
/// use roleset_core::redis::RedisCacheStore;
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let store = RedisCacheStore::connect(&RedisCacheConfig::from_env()).await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RedisCacheStore {
    connection: MultiplexedConnection,
}

impl RedisCacheStore {
    /// Open a client and establish the multiplexed connection.
    ///
    /// # Arguments
    ///
    /// * `config` - Redis connection settings
    pub async fn connect(config: &RedisCacheConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        debug!(url = %config.url, "Connected Redis cache store");
        Ok(Self { connection })
    }
}

impl std::fmt::Debug for RedisCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.connection.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        // EX 0 is rejected by Redis.
        let seconds = ttl.as_secs().max(1);
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(seconds)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    fn supports_multi_get(&self) -> bool {
        true
    }

    async fn multi_get(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection.clone();
        redis::cmd("MGET")
            .arg(keys)
            .query_async::<_, Vec<Option<String>>>(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }
}
