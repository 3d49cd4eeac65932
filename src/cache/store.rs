//! Key-value store trait and Redis implementation
//!
//! String-valued operations over pooled Redis connections with fault
//! tolerance: an unreachable pool degrades to a miss instead of failing the
//! caller. Command-level failures still propagate.

use super::{error::CacheResult, RedisPool};
use async_trait::async_trait;
use bb8::PooledConnection;
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, warn};

type RedisConnection<'a> = PooledConnection<'a, RedisConnectionManager>;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Set a value with optional TTL
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()>;

    /// Atomically set a value only when the key is absent (SET NX EX).
    /// Returns true when this call created the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool>;

    /// Delete a key, returning whether it existed
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Check if a key exists
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Increment a counter and refresh its TTL, returning the new count
    async fn increment(&self, key: &str, ttl: Duration) -> CacheResult<i64>;

    /// Set expiration time for a key
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;

    /// Get time-to-live for a key in seconds
    async fn ttl(&self, key: &str) -> CacheResult<i64>;
}

/// Redis implementation of the KeyValueStore trait
pub struct RedisStore {
    pool: RedisPool,
}

impl RedisStore {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool with error handling
    async fn get_connection(&self) -> CacheResult<RedisConnection<'_>> {
        self.pool.get().await.map_err(|e| {
            warn!("Failed to get Redis connection: {}", e);
            e.into()
        })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(_) => return Ok(None), // Graceful degradation
        };

        let result: Option<String> = conn.get(key).await.map_err(|e| {
            warn!("Redis GET failed for key '{}': {}", key, e);
            e
        })?;

        Ok(result)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(_) => return Ok(()), // Graceful degradation - don't fail
        };

        match ttl {
            Some(ttl_duration) => {
                let _: () = conn
                    .set_ex(key, value, ttl_duration.as_secs())
                    .await
                    .map_err(|e| {
                        warn!("Redis SET_EX failed for key '{}': {}", key, e);
                        e
                    })?;
            }
            None => {
                let _: () = conn.set(key, value).await.map_err(|e| {
                    warn!("Redis SET failed for key '{}': {}", key, e);
                    e
                })?;
            }
        }

        debug!("Cache set for key: {} (ttl: {:?})", key, ttl);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            // Graceful degradation - treat the claim as won so processing
            // continues when Redis is unreachable
            Err(_) => return Ok(true),
        };

        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut *conn)
            .await
            .map_err(|e| {
                warn!("Redis SET NX failed for key '{}': {}", key, e);
                e
            })?;

        let claimed = result.is_some();
        debug!("Cache set_if_absent for key: {} (claimed: {})", key, claimed);
        Ok(claimed)
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(_) => return Ok(false), // Graceful degradation
        };

        let result: i32 = conn.del(key).await.map_err(|e| {
            warn!("Redis DEL failed for key '{}': {}", key, e);
            e
        })?;

        Ok(result > 0)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(_) => return Ok(false), // Graceful degradation
        };

        let result: i32 = conn.exists(key).await.map_err(|e| {
            warn!("Redis EXISTS failed for key '{}': {}", key, e);
            e
        })?;

        Ok(result > 0)
    }

    async fn increment(&self, key: &str, ttl: Duration) -> CacheResult<i64> {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(_) => return Ok(0), // Graceful degradation
        };

        let count: i64 = conn.incr(key, 1).await.map_err(|e| {
            warn!("Redis INCR failed for key '{}': {}", key, e);
            e
        })?;

        // Refresh the TTL on every increment so the counter tracks a
        // rolling window
        let _: i32 = conn.expire(key, ttl.as_secs() as i64).await.map_err(|e| {
            warn!("Redis EXPIRE failed for key '{}': {}", key, e);
            e
        })?;

        Ok(count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(_) => return Ok(false), // Graceful degradation
        };

        let result: i32 = conn.expire(key, ttl.as_secs() as i64).await.map_err(|e| {
            warn!("Redis EXPIRE failed for key '{}': {}", key, e);
            e
        })?;

        Ok(result > 0)
    }

    async fn ttl(&self, key: &str) -> CacheResult<i64> {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(_) => return Ok(-2), // Graceful degradation - key treated as absent
        };

        let result: i64 = conn.ttl(key).await.map_err(|e| {
            warn!("Redis TTL failed for key '{}': {}", key, e);
            e
        })?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require a running Redis instance
    // Run with: REDIS_URL=redis://localhost:6379 cargo test -- --ignored

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_set_if_absent_claims_once() {
        let pool = super::super::init_cache_pool(super::super::CacheConfig::default())
            .await
            .unwrap();
        let store = RedisStore::new(pool);

        let key = "test:claim";
        let _ = store.delete(key).await;

        assert!(store
            .set_if_absent(key, "a", Duration::from_secs(60))
            .await
            .unwrap());
        assert!(!store
            .set_if_absent(key, "b", Duration::from_secs(60))
            .await
            .unwrap());
        assert_eq!(store.get(key).await.unwrap(), Some("a".to_string()));

        let _ = store.delete(key).await;
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_increment_refreshes_ttl() {
        let pool = super::super::init_cache_pool(super::super::CacheConfig::default())
            .await
            .unwrap();
        let store = RedisStore::new(pool);

        let key = "test:counter";
        let _ = store.delete(key).await;

        assert_eq!(store.increment(key, Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(store.increment(key, Duration::from_secs(60)).await.unwrap(), 2);
        assert!(store.ttl(key).await.unwrap() > 0);

        let _ = store.delete(key).await;
    }
}
