use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use super::{CoordError, ReadCache, SlotLock};

/// Redis-backed lock/cache shared by every engine instance pointed at the
/// same server. Locks are `SET key NX PX ttl`; cache entries are `SETEX`.
#[derive(Clone)]
pub struct RedisCoordinator {
    conn_manager: ConnectionManager,
}

impl RedisCoordinator {
    /// Accepts `redis://` and `rediss://` (TLS) URLs.
    pub async fn connect(redis_url: &str) -> Result<Self, CoordError> {
        let client = Client::open(redis_url)
            .map_err(|e| CoordError::Backend(format!("invalid Redis URL: {e}")))?;
        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| CoordError::Backend(format!("failed to connect to Redis: {e}")))?;
        tracing::info!("connected to Redis lock/cache service");
        Ok(Self { conn_manager })
    }
}

fn backend(e: redis::RedisError) -> CoordError {
    CoordError::Backend(e.to_string())
}

#[async_trait]
impl SlotLock for RedisCoordinator {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, CoordError> {
        let mut conn = self.conn_manager.clone();
        #[allow(clippy::cast_possible_truncation)]
        let ttl_ms = ttl.as_millis().max(1) as u64;
        // Reply is "OK" when set, nil when the key already exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("locked")
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(reply.is_some())
    }

    async fn release(&self, key: &str) -> Result<(), CoordError> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn.del(key).await.map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl ReadCache for RedisCoordinator {
    async fn get(&self, key: &str) -> Result<Option<String>, CoordError> {
        let mut conn = self.conn_manager.clone();
        let value: Option<String> = conn.get(key).await.map_err(backend)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CoordError> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .set_ex(key, value, ttl.as_secs().max(1))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), CoordError> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn.del(key).await.map_err(backend)?;
        Ok(())
    }
}
