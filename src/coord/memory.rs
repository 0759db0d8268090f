use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use super::{CoordError, ReadCache, SlotLock};

/// Single-process lock/cache. Atomicity comes from the map's shard lock;
/// expired entries are treated as absent and purged by [`sweep`](Self::sweep).
#[derive(Default)]
pub struct MemoryCoordinator {
    locks: DashMap<String, Instant>,
    cache: DashMap<String, (String, Instant)>,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired locks and cache entries. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.locks.len() + self.cache.len();
        self.locks.retain(|_, expires_at| *expires_at > now);
        self.cache.retain(|_, (_, expires_at)| *expires_at > now);
        before - (self.locks.len() + self.cache.len())
    }

    pub fn held_locks(&self) -> usize {
        let now = Instant::now();
        self.locks.iter().filter(|e| *e.value() > now).count()
    }
}

#[async_trait]
impl SlotLock for MemoryCoordinator {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, CoordError> {
        let now = Instant::now();
        match self.locks.entry(key.to_string()) {
            Entry::Occupied(mut held) => {
                if *held.get() > now {
                    return Ok(false);
                }
                held.insert(now + ttl);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(now + ttl);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str) -> Result<(), CoordError> {
        self.locks.remove(key);
        Ok(())
    }
}

#[async_trait]
impl ReadCache for MemoryCoordinator {
    async fn get(&self, key: &str) -> Result<Option<String>, CoordError> {
        let now = Instant::now();
        Ok(self
            .cache
            .get(key)
            .filter(|e| e.value().1 > now)
            .map(|e| e.value().0.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CoordError> {
        self.cache.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), CoordError> {
        self.cache.remove(key);
        Ok(())
    }
}
