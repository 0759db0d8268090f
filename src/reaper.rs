use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::coord::MemoryCoordinator;
use crate::store::WalStore;

/// Periodically purge expired lock tokens and cache entries.
pub async fn run_sweeper(coord: Arc<MemoryCoordinator>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let removed = coord.sweep();
        if removed > 0 {
            debug!("swept {removed} expired lock/cache entries");
        }
    }
}

/// Compact the WAL once enough appends have piled up since the last rewrite.
pub async fn run_compactor(store: Arc<WalStore>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if compact_if_due(&store, threshold).await {
            info!("WAL compacted");
        }
    }
}

async fn compact_if_due(store: &WalStore, threshold: u64) -> bool {
    let appends = store.appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
            true
        }
        Err(e) => {
            warn!("WAL compaction after {appends} appends failed: {e}");
            false
        }
    }
}
