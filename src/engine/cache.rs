use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::coord::{Coordinator, ReadCache, reservations_by_date_key, restaurant_key};
use crate::observability::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL, CACHE_WRITE_FAILURES_TOTAL};

/// Read-through JSON cache in front of the store.
///
/// Every failure here is a freshness problem, never a correctness one, so
/// nothing is propagated: backend errors and undecodable payloads read as a
/// miss, failed writes and invalidations are logged and counted.
pub(crate) struct CacheCoordinator {
    backend: Arc<dyn Coordinator>,
    ttl: Duration,
}

impl CacheCoordinator {
    pub(crate) fn new(backend: Arc<dyn Coordinator>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    pub(crate) fn ttl(&self) -> Duration {
        self.ttl
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, key: &str, cache: &'static str) -> Option<T> {
        let hit = match self.backend.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = %key, "discarding undecodable cache entry: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, "cache read failed: {e}");
                None
            }
        };
        let metric = if hit.is_some() { CACHE_HITS_TOTAL } else { CACHE_MISSES_TOTAL };
        metrics::counter!(metric, "cache" => cache).increment(1);
        debug!(key = %key, hit = hit.is_some(), "cache lookup");
        hit
    }

    pub(crate) async fn put<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, "cache payload not serializable: {e}");
                return;
            }
        };
        if let Err(e) = self.backend.set(key, raw, self.ttl).await {
            warn!(key = %key, "cache populate failed: {e}");
            metrics::counter!(CACHE_WRITE_FAILURES_TOTAL, "op" => "set").increment(1);
        }
    }

    pub(crate) async fn invalidate(&self, key: &str) {
        if let Err(e) = self.backend.invalidate(key).await {
            warn!(key = %key, "cache invalidation failed, entry stale until TTL: {e}");
            metrics::counter!(CACHE_WRITE_FAILURES_TOTAL, "op" => "invalidate").increment(1);
        }
    }

    /// Drop the by-date listing for each date plus the restaurant detail.
    pub(crate) async fn invalidate_reservation_views(&self, restaurant_id: Ulid, dates: &[NaiveDate]) {
        for (i, date) in dates.iter().enumerate() {
            if dates[..i].contains(date) {
                continue;
            }
            self.invalidate(&reservations_by_date_key(restaurant_id, *date)).await;
        }
        self.invalidate(&restaurant_key(restaurant_id)).await;
    }
}
