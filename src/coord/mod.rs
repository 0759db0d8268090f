//! Shared lock/cache service.
//!
//! Two operation groups: [`SlotLock`] (set-if-absent tokens with expiry) and
//! [`ReadCache`] (opaque payloads with TTL). Both are advisory to the store:
//! the lock narrows the race window, the cache is never read for admission.

mod memory;
mod remote;

pub use self::memory::MemoryCoordinator;
pub use self::remote::RedisCoordinator;

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{TimeWindow, to_rfc3339};

#[derive(Debug)]
pub enum CoordError {
    Backend(String),
}

impl std::fmt::Display for CoordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordError::Backend(e) => write!(f, "lock/cache backend error: {e}"),
        }
    }
}

impl std::error::Error for CoordError {}

#[async_trait]
pub trait SlotLock: Send + Sync {
    /// Single atomic set-if-absent with expiry. `Ok(false)` when another
    /// holder currently owns `key`. Never waits or retries.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, CoordError>;

    /// Delete `key` whoever holds it. Idempotent.
    async fn release(&self, key: &str) -> Result<(), CoordError>;
}

#[async_trait]
pub trait ReadCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CoordError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CoordError>;

    async fn invalidate(&self, key: &str) -> Result<(), CoordError>;
}

/// Both groups behind one handle.
pub trait Coordinator: SlotLock + ReadCache {}

impl<T: SlotLock + ReadCache> Coordinator for T {}

// ── Key layout ───────────────────────────────────────────

/// Exact table + window. Different windows never share a key, even when they overlap.
pub fn table_slot_key(table_id: Ulid, window: TimeWindow) -> String {
    format!(
        "lock:table:{table_id}:{}:{}",
        to_rfc3339(window.start),
        to_rfc3339(window.end)
    )
}

pub fn table_number_key(restaurant_id: Ulid, number: u32) -> String {
    format!("lock:restaurant:{restaurant_id}:table:{number}")
}

pub fn reservations_by_date_key(restaurant_id: Ulid, date: NaiveDate) -> String {
    format!("reservations:{restaurant_id}:{}", date.format("%Y-%m-%d"))
}

pub fn restaurant_key(restaurant_id: Ulid) -> String {
    format!("restaurant:{restaurant_id}")
}
