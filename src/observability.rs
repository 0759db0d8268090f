use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

// ── Admission ───────────────────────────────────────────────────

/// Counter: reservations committed. Labels: operation.
pub const RESERVATIONS_ADMITTED_TOTAL: &str = "tablebook_reservations_admitted_total";

/// Counter: failed operations. Labels: operation, reason.
pub const ADMISSIONS_REJECTED_TOTAL: &str = "tablebook_admissions_rejected_total";

/// Histogram: engine operation latency in seconds. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "tablebook_operation_duration_seconds";

// ── Lock / cache ────────────────────────────────────────────────

/// Counter: lock attempts that found the slot already held.
pub const LOCK_CONTENDED_TOTAL: &str = "tablebook_lock_contended_total";

/// Counter: lock releases that failed (token left to expire).
pub const LOCK_RELEASE_FAILURES_TOTAL: &str = "tablebook_lock_release_failures_total";

/// Counter: cache hits. Labels: cache.
pub const CACHE_HITS_TOTAL: &str = "tablebook_cache_hits_total";

/// Counter: cache misses. Labels: cache.
pub const CACHE_MISSES_TOTAL: &str = "tablebook_cache_misses_total";

/// Counter: failed cache populates/invalidations. Labels: op.
pub const CACHE_WRITE_FAILURES_TOTAL: &str = "tablebook_cache_write_failures_total";

// ── Store ───────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "tablebook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "tablebook_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "tablebook_wal_compactions_total";

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
/// No-op if a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init_metrics(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
