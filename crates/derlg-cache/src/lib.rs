//! Redis support for the DerLg booking engine
//!
//! Redis holds two kinds of short-lived state:
//!
//! - provider status snapshots, read cache-aside by the status endpoint
//! - monitor leases, so only one instance polls a QR payment at a time
//!
//! Inventory capacity never goes through here. Every caller treats Redis as
//! optional and keeps working when it is down.
//!
//! # Example
//!
//! ```no_run
//! use derlg_cache::{keys, RedisCache};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = RedisCache::new("redis://127.0.0.1:6379").await?;
//!
//!     let key = keys::qr_monitor_key("42");
//!     if cache.try_lease(&key, "instance-a", 900).await? {
//!         // ... poll ...
//!         cache.release_lease(&key, "instance-a").await?;
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod keys;

use async_trait::async_trait;
use derlg_core::error::AppError;
use derlg_core::traits::CacheService;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError, Script};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, warn};

/// Deletes the lease only while `owner` still holds it
const RELEASE_LEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Multiplexed Redis connection
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    /// Connect to Redis
    ///
    /// # Errors
    ///
    /// `AppError::CacheConnection` for a bad URL or an unreachable server
    pub async fn new(url: &str) -> Result<Self, AppError> {
        let client = Client::open(url).map_err(|e| {
            error!("Invalid Redis URL: {}", e);
            AppError::CacheConnection(format!("Invalid Redis URL: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Could not reach Redis: {}", e);
            AppError::CacheConnection(format!("Connection failed: {}", e))
        })?;

        debug!("Redis connection ready");
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        let _: String = redis::cmd("PING")
            .query_async(&mut self.conn())
            .await
            .map_err(Self::map_redis_error)?;
        Ok(())
    }

    /// Take `key` for `owner` unless someone already holds it
    pub async fn try_lease(&self, key: &str, owner: &str, ttl_secs: u64) -> Result<bool, AppError> {
        let taken = self.set_nx(key, owner, ttl_secs).await?;
        debug!("Lease {} for {}: {}", key, owner, if taken { "taken" } else { "busy" });
        Ok(taken)
    }

    /// Current lease holder, if any
    pub async fn lease_holder(&self, key: &str) -> Result<Option<String>, AppError> {
        self.conn().get(key).await.map_err(Self::map_redis_error)
    }

    /// Drop the lease if `owner` still holds it
    ///
    /// An expired lease that another instance has since taken is left alone.
    pub async fn release_lease(&self, key: &str, owner: &str) -> Result<bool, AppError> {
        let released: i32 = Script::new(RELEASE_LEASE_SCRIPT)
            .key(key)
            .arg(owner)
            .invoke_async(&mut self.conn())
            .await
            .map_err(Self::map_redis_error)?;

        if released == 0 {
            debug!("Lease {} no longer held by {}", key, owner);
        }
        Ok(released > 0)
    }

    #[cfg(test)]
    async fn flush_db(&self) -> Result<(), AppError> {
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut self.conn())
            .await
            .map_err(Self::map_redis_error)?;
        Ok(())
    }

    fn map_redis_error(err: RedisError) -> AppError {
        if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
            warn!("Redis connection problem: {}", err);
            AppError::CacheConnection(err.to_string())
        } else {
            error!("Redis command failed: {}", err);
            AppError::Cache(err.to_string())
        }
    }
}

#[async_trait]
impl CacheService for RedisCache {
    /// JSON value at `key`
    ///
    /// A value that no longer decodes (written by an older build) is removed
    /// and reported as a miss.
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, AppError> {
        let raw: Option<String> = self.conn().get(key).await.map_err(Self::map_redis_error)?;

        let Some(json) = raw else {
            debug!("Cache miss: {}", key);
            return Ok(None);
        };

        match serde_json::from_str::<T>(&json) {
            Ok(value) => {
                debug!("Cache hit: {}", key);
                return Ok(Some(value));
            }
            Err(e) => warn!("Dropping undecodable cache entry {}: {}", key, e),
        }

        if let Err(e) = self.delete(key).await {
            warn!("Failed to evict cache entry {}: {}", key, e);
        }
        Ok(None)
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), AppError> {
        let json = serde_json::to_string(value).map_err(|e| {
            error!("Cannot encode cache entry {}: {}", key, e);
            AppError::Serialization(e.to_string())
        })?;

        let _: () = self
            .conn()
            .set_ex(key, json, ttl_secs)
            .await
            .map_err(Self::map_redis_error)?;

        debug!("Cached {} for {}s", key, ttl_secs);
        Ok(())
    }

    /// `SET key value NX EX ttl`
    async fn set_nx(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, AppError> {
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut self.conn())
            .await
            .map_err(Self::map_redis_error)?;

        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let deleted: i32 = self.conn().del(key).await.map_err(Self::map_redis_error)?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct StatusSnapshot {
        reference: String,
        status: String,
    }

    fn assert_send<F: std::future::Future + Send>(_future: F) {}

    fn cache_futures_are_send(cache: &RedisCache) {
        assert_send(cache.get::<StatusSnapshot>("payment_status:pi_1"));
        assert_send(cache.release_lease("qr_monitor:b1", "a"));
    }

    #[test]
    fn test_cache_futures_compile_as_send() {
        let check: fn(&RedisCache) = cache_futures_are_send;
        let _ = check;
    }

    async fn setup_cache() -> RedisCache {
        let cache = RedisCache::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");
        cache.flush_db().await.expect("Failed to flush DB");
        cache
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_status_snapshot_round_trip() {
        let cache = setup_cache().await;

        let data = StatusSnapshot {
            reference: "pi_123".to_string(),
            status: "pending".to_string(),
        };
        cache.set("payment_status:pi_123", &data, 60).await.unwrap();

        let hit: Option<StatusSnapshot> = cache.get("payment_status:pi_123").await.unwrap();
        assert_eq!(hit, Some(data));

        let miss: Option<StatusSnapshot> = cache.get("payment_status:none").await.unwrap();
        assert_eq!(miss, None);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_undecodable_entry_is_a_miss() {
        let cache = setup_cache().await;

        cache.set("payment_status:old", &42, 60).await.unwrap();
        let value: Option<StatusSnapshot> = cache.get("payment_status:old").await.unwrap();
        assert_eq!(value, None);
        assert!(!cache.delete("payment_status:old").await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_lease_is_exclusive_and_owned() {
        let cache = setup_cache().await;

        assert!(cache.try_lease("qr_monitor:b1", "a", 60).await.unwrap());
        assert!(!cache.try_lease("qr_monitor:b1", "b", 60).await.unwrap());
        assert_eq!(
            cache.lease_holder("qr_monitor:b1").await.unwrap(),
            Some("a".to_string())
        );

        assert!(!cache.release_lease("qr_monitor:b1", "b").await.unwrap());
        assert!(cache.release_lease("qr_monitor:b1", "a").await.unwrap());
        assert!(cache.try_lease("qr_monitor:b1", "b", 60).await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_snapshot_expires() {
        let cache = setup_cache().await;

        let data = StatusSnapshot {
            reference: "md5".to_string(),
            status: "succeeded".to_string(),
        };
        cache.set("payment_status:md5", &data, 1).await.unwrap();

        tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

        let result: Option<StatusSnapshot> = cache.get("payment_status:md5").await.unwrap();
        assert_eq!(result, None);
    }
}
