//! Approximate LRU eviction for the cache region.
//!
//! The planner is pure: it takes a snapshot of every entry and returns the
//! keys to delete.  [`PersistentStore::set_cache`](crate::PersistentStore::set_cache)
//! runs it inside the same transaction as the write.

use crate::config::StoreConfig;

/// What the planner needs to know about one cache row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate {
    pub key: String,
    pub size_bytes: u64,
    /// Unix milliseconds.
    pub last_accessed: i64,
}

/// Bounds that trigger an eviction pass, and how much one pass removes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionPolicy {
    pub max_bytes: u64,
    pub max_entries: u64,
    pub fraction: f64,
}

impl EvictionPolicy {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            max_bytes: config.cache_max_bytes,
            max_entries: config.cache_max_entries,
            fraction: config.eviction_fraction.clamp(0.0, 1.0),
        }
    }

    fn over_limit(&self, count: u64, total_bytes: u64) -> bool {
        count > self.max_entries || total_bytes > self.max_bytes
    }
}

/// Pick the keys to evict before writing an entry of `incoming_bytes`.
///
/// `candidates` are the rows already stored, minus the one the write will
/// replace.  Nothing is removed while the count and the summed size, with the
/// incoming entry included, stay within bounds.  Otherwise entries are taken oldest `last_accessed` first
/// (ties broken by key) until at least `fraction` of the original count AND
/// at least `fraction` of the original size are gone, or nothing is left.
/// An over-limit pass always removes at least one entry.
pub fn plan_eviction(
    mut candidates: Vec<EvictionCandidate>,
    incoming_bytes: u64,
    policy: &EvictionPolicy,
) -> Vec<String> {
    let count = candidates.len() as u64;
    let total_bytes: u64 = candidates.iter().map(|c| c.size_bytes).sum();

    if candidates.is_empty()
        || !policy.over_limit(count + 1, total_bytes.saturating_add(incoming_bytes))
    {
        return Vec::new();
    }

    let count_target = ((count as f64 * policy.fraction).ceil() as u64).max(1);
    let bytes_target = (total_bytes as f64 * policy.fraction).ceil() as u64;

    candidates.sort_by(|a, b| {
        a.last_accessed
            .cmp(&b.last_accessed)
            .then_with(|| a.key.cmp(&b.key))
    });

    let mut removed_count = 0u64;
    let mut removed_bytes = 0u64;
    let mut keys = Vec::new();

    for candidate in candidates {
        if removed_count >= count_target && removed_bytes >= bytes_target {
            break;
        }
        removed_count += 1;
        removed_bytes += candidate.size_bytes;
        keys.push(candidate.key);
    }

    keys
}
