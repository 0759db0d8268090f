use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::coord::{Coordinator, MemoryCoordinator, RedisCoordinator};
use crate::engine::BookingEngine;
use crate::limits::{DEFAULT_CACHE_TTL_SECS, DEFAULT_COMPACT_THRESHOLD, DEFAULT_LOCK_TTL_MS};
use crate::{observability, reaper};
use crate::store::WalStore;

const WAL_FILE: &str = "tablebook.wal";
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Shared lock/cache backend; in-process when unset.
    pub redis_url: Option<String>,
    pub lock_ttl: Duration,
    pub cache_ttl: Duration,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            redis_url: None,
            lock_ttl: Duration::from_millis(DEFAULT_LOCK_TTL_MS as u64),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            metrics_port: None,
        }
    }
}

/// A running engine plus the store handle the background tasks hold.
pub struct Service {
    pub engine: Arc<BookingEngine>,
    pub store: Arc<WalStore>,
}

impl Config {
    /// Read `TABLEBOOK_*` variables; unset or unparseable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = lookup("TABLEBOOK_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        config.redis_url = lookup("TABLEBOOK_REDIS_URL").filter(|s| !s.is_empty());
        if let Some(ms) = lookup("TABLEBOOK_LOCK_TTL_MS").and_then(|s| s.parse::<u64>().ok()) {
            config.lock_ttl = Duration::from_millis(ms);
        }
        if let Some(secs) = lookup("TABLEBOOK_CACHE_TTL_SECS").and_then(|s| s.parse::<u64>().ok()) {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(n) = lookup("TABLEBOOK_COMPACT_THRESHOLD").and_then(|s| s.parse().ok()) {
            config.compact_threshold = n;
        }
        config.metrics_port = lookup("TABLEBOOK_METRICS_PORT").and_then(|s| s.parse().ok());
        config
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE)
    }

    /// Install the metrics exporter (if a port is set), open the store, pick
    /// the coordinator, and start the sweeper/compactor.
    /// Must be called inside a tokio runtime.
    pub async fn connect(&self) -> Result<Service, Box<dyn std::error::Error + Send + Sync>> {
        observability::init_metrics(self.metrics_port)
            .map_err(|e| format!("metrics exporter: {e}"))?;
        std::fs::create_dir_all(&self.data_dir)?;
        let store = Arc::new(WalStore::open(&self.wal_path())?);

        let coord: Arc<dyn Coordinator> = match &self.redis_url {
            Some(url) => {
                info!("lock/cache backend: redis");
                Arc::new(RedisCoordinator::connect(url).await?)
            }
            None => {
                info!("lock/cache backend: in-process");
                let memory = Arc::new(MemoryCoordinator::new());
                tokio::spawn(reaper::run_sweeper(memory.clone(), SWEEP_INTERVAL));
                memory
            }
        };
        tokio::spawn(reaper::run_compactor(
            store.clone(),
            self.compact_threshold,
            COMPACT_CHECK_INTERVAL,
        ));

        let engine = BookingEngine::new(store.clone(), coord)
            .with_lock_ttl(self.lock_ttl)
            .with_cache_ttl(self.cache_ttl);
        Ok(Service { engine: Arc::new(engine), store })
    }
}
