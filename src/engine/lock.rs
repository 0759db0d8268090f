use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::coord::{Coordinator, SlotLock};

use super::BookingError;

/// A held slot lock. Call [`release`](Self::release) on every path; if the
/// guard is dropped instead (panic, cancelled future) the release is spawned
/// onto the current runtime, and the token's TTL covers the rest.
pub(crate) struct SlotGuard {
    coord: Arc<dyn Coordinator>,
    key: Option<String>,
}

impl SlotGuard {
    pub(crate) async fn release(mut self) {
        if let Some(key) = self.key.take() {
            release_logged(self.coord.as_ref(), &key).await;
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else { return };
        let coord = self.coord.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { release_logged(coord.as_ref(), &key).await });
            }
            Err(_) => warn!(key = %key, "slot guard dropped outside a runtime; lock left to expire"),
        }
    }
}

async fn release_logged(coord: &dyn Coordinator, key: &str) {
    if let Err(e) = coord.release(key).await {
        warn!(key = %key, "failed to release slot lock: {e}");
        metrics::counter!(crate::observability::LOCK_RELEASE_FAILURES_TOTAL).increment(1);
    }
}

/// Single attempt; `SlotBusy` if another holder has `key`.
pub(crate) async fn acquire_slot(
    coord: &Arc<dyn Coordinator>,
    key: String,
    ttl: Duration,
) -> Result<SlotGuard, BookingError> {
    if !coord.try_acquire(&key, ttl).await? {
        debug!(key = %key, "slot lock busy");
        metrics::counter!(crate::observability::LOCK_CONTENDED_TOTAL).increment(1);
        return Err(BookingError::SlotBusy);
    }
    Ok(SlotGuard { coord: coord.clone(), key: Some(key) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::MemoryCoordinator;

    const TTL: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn second_acquire_is_busy_until_release() {
        let mem = Arc::new(MemoryCoordinator::new());
        let coord: Arc<dyn Coordinator> = mem.clone();
        let guard = acquire_slot(&coord, "k".into(), TTL).await.unwrap();
        assert!(matches!(
            acquire_slot(&coord, "k".into(), TTL).await,
            Err(BookingError::SlotBusy)
        ));
        guard.release().await;
        assert_eq!(mem.held_locks(), 0);
        acquire_slot(&coord, "k".into(), TTL).await.unwrap().release().await;
    }

    #[tokio::test]
    async fn dropped_guard_releases_in_background() {
        let mem = Arc::new(MemoryCoordinator::new());
        let coord: Arc<dyn Coordinator> = mem.clone();
        {
            let _guard = acquire_slot(&coord, "k".into(), TTL).await.unwrap();
        }
        for _ in 0..10 {
            if mem.held_locks() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(mem.try_acquire("k", TTL).await.unwrap());
    }
}
