// Redis-backed hash store implementation
// Shares the parent-token containers across multiple server instances

use super::{HashStore, KeyTtl, StoreError, ttl_millis};
use async_trait::async_trait;
use redis::{AsyncCommands, RedisError, aio::MultiplexedConnection};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Redis hash store: one Redis hash per key, key expiry via PEXPIRE
pub struct RedisHashStore {
    /// Redis connection
    conn: Arc<Mutex<MultiplexedConnection>>,
}

impl RedisHashStore {
    /// Connect to the Redis server at `redis_url`
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url).map_err(map_redis_error)?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(map_redis_error)?;

        debug!("Connected Redis hash store at {}", redis_url);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn map_redis_error(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
        error!("Redis connection error: {}", e);
        StoreError::Connection(e.to_string())
    } else {
        error!("Redis error: {}", e);
        StoreError::Backend(e.to_string())
    }
}

/// Translate a PTTL reply (-2 missing, -1 no expiry)
fn ttl_from_pttl(pttl: i64) -> KeyTtl {
    match pttl {
        -2 => KeyTtl::Missing,
        ms if ms < 0 => KeyTtl::Persistent,
        ms => KeyTtl::Expires(Duration::from_millis(ms as u64)),
    }
}

#[async_trait]
impl HashStore for RedisHashStore {
    async fn set_fields(
        &self,
        key: &str,
        fields: Vec<(String, Vec<u8>)>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().await;

        let mut pipe = redis::pipe();
        pipe.atomic().cmd("HSET").arg(key).arg(&fields).ignore();
        if let Some(ttl) = ttl {
            pipe.cmd("PEXPIRE")
                .arg(key)
                .arg(ttl_millis(ttl))
                .ignore();
        }

        let _: () = pipe
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn get_field(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.lock().await;
        let value: Option<Vec<u8>> = conn.hget(key, field).await.map_err(map_redis_error)?;
        Ok(value)
    }

    async fn get_all_fields(&self, key: &str) -> Result<HashMap<String, Vec<u8>>, StoreError> {
        let mut conn = self.conn.lock().await;
        let all: HashMap<String, Vec<u8>> = conn.hgetall(key).await.map_err(map_redis_error)?;
        Ok(all)
    }

    async fn delete_fields(&self, key: &str, fields: &[String]) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().await;
        let _: i64 = conn.hdel(key, fields).await.map_err(map_redis_error)?;
        Ok(())
    }

    async fn delete_key(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        let _: i64 = conn.del(key).await.map_err(map_redis_error)?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.lock().await;
        let applied: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        Ok(applied == 1)
    }

    async fn remaining_ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        let mut conn = self.conn.lock().await;
        let pttl: i64 = conn.pttl(key).await.map_err(map_redis_error)?;
        Ok(ttl_from_pttl(pttl))
    }
}
