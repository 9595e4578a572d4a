use std::time::Duration;

use hearth_shared::constants::{
    CACHE_DEFAULT_TTL_SECS, CACHE_EVICTION_FRACTION, CACHE_MAX_BYTES, CACHE_MAX_ENTRIES,
    SESSION_TTL_SECS,
};

/// Retention and size limits for the store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Lifetime of a session record after its last write.
    pub session_ttl: Duration,
    /// Lifetime of a message record after its last write.
    pub message_ttl: Duration,
    /// TTL used by `set_cache` when the caller passes none.
    pub cache_default_ttl: Duration,
    /// Bound on the summed JSON size of all cache values.
    pub cache_max_bytes: u64,
    /// Bound on the number of cache entries.
    pub cache_max_entries: u64,
    /// Share of entries (and of bytes) an eviction pass removes.
    pub eviction_fraction: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(SESSION_TTL_SECS),
            message_ttl: Duration::from_secs(SESSION_TTL_SECS),
            cache_default_ttl: Duration::from_secs(CACHE_DEFAULT_TTL_SECS),
            cache_max_bytes: CACHE_MAX_BYTES,
            cache_max_entries: CACHE_MAX_ENTRIES,
            eviction_fraction: CACHE_EVICTION_FRACTION,
        }
    }
}
