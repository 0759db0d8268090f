use crate::model::Ms;

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_PHONE_LEN: usize = 32;

pub const MAX_PARTY_SIZE: u32 = 1_000;
pub const MAX_TABLE_CAPACITY: u32 = 1_000;

pub const MIN_DURATION_MINUTES: u32 = 15;
/// A reservation never spans more than one day.
pub const MAX_DURATION_MINUTES: u32 = 24 * 60;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

pub const DEFAULT_LOCK_TTL_MS: Ms = 5_000;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60;

/// Appends since the last compaction before the compactor rewrites the WAL.
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1_000;

