mod cache;
mod error;
mod hours;
mod input;
mod lock;
mod mutations;
mod overlap;
mod queries;

pub use error::{BookingError, ErrorKind};

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::coord::Coordinator;
use crate::limits::{DEFAULT_CACHE_TTL_SECS, DEFAULT_LOCK_TTL_MS};
use crate::observability::{ADMISSIONS_REJECTED_TOTAL, OPERATION_DURATION_SECONDS};
use crate::store::ReservationStore;

use cache::CacheCoordinator;

/// Admission core for table reservations.
///
/// Holds no locks of its own. Mutual exclusion on an exact table+window
/// comes from the coordinator's slot lock; the overlap query re-run under
/// that lock is the authority on conflicts.
pub struct BookingEngine {
    pub(crate) store: Arc<dyn ReservationStore>,
    pub(crate) coord: Arc<dyn Coordinator>,
    pub(crate) cache: CacheCoordinator,
    pub(crate) lock_ttl: Duration,
}

impl BookingEngine {
    pub fn new(store: Arc<dyn ReservationStore>, coord: Arc<dyn Coordinator>) -> Self {
        Self {
            store,
            cache: CacheCoordinator::new(coord.clone(), Duration::from_secs(DEFAULT_CACHE_TTL_SECS)),
            coord,
            lock_ttl: Duration::from_millis(DEFAULT_LOCK_TTL_MS as u64),
        }
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = CacheCoordinator::new(self.coord.clone(), ttl);
        self
    }

    pub fn lock_ttl(&self) -> Duration {
        self.lock_ttl
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache.ttl()
    }

    pub fn store(&self) -> &Arc<dyn ReservationStore> {
        &self.store
    }
}

/// Record latency and, on failure, the rejection reason.
pub(crate) fn observe<T>(operation: &'static str, started: Instant, result: &Result<T, BookingError>) {
    metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => operation)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = result {
        metrics::counter!(ADMISSIONS_REJECTED_TOTAL, "operation" => operation, "reason" => e.reason())
            .increment(1);
        tracing::debug!(operation, reason = e.reason(), "rejected: {e}");
    }
}
