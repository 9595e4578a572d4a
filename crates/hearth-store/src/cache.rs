//! The TTL + LRU cache region.
//!
//! Values are stored as JSON text; an entry's size is the byte length of that
//! text.  Reads hide expired entries and refresh `last_accessed`.  Every write
//! first runs an eviction pass in the same transaction.

use std::time::Duration;

use rusqlite::{params, OptionalExtension, Transaction};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{OpContext, Result};
use crate::eviction::{plan_eviction, EvictionCandidate, EvictionPolicy};
use crate::models::CacheStats;
use crate::store::{expiry_millis, PersistentStore};

impl PersistentStore {
    /// Look up a live entry and mark it as recently used.
    ///
    /// Returns `None` for a missing or expired key.  A stored value that no
    /// longer decodes as `T` is an error, not a miss.
    pub async fn get_cache<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let now_ms = self.now().timestamp_millis();

        let raw = self
            .with_tx(|tx| {
                let raw: Option<String> = tx
                    .query_row(
                        "SELECT value FROM cache WHERE key = ?1 AND expires_at >= ?2",
                        params![key, now_ms],
                        |row| row.get(0),
                    )
                    .optional()?;
                if raw.is_some() {
                    tx.execute(
                        "UPDATE cache SET last_accessed = ?2 WHERE key = ?1",
                        params![key, now_ms],
                    )?;
                }
                Ok(raw)
            })
            .await
            .op("get_cache", key)?;

        match raw {
            Some(text) => Ok(Some(serde_json::from_str::<T>(&text).op("get_cache", key)?)),
            None => Ok(None),
        }
    }

    /// Store `value` under `key` for `ttl` (the configured default when
    /// `None`), evicting least recently used entries first if the write would
    /// break the count or size bound.
    pub async fn set_cache<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let text = serde_json::to_string(value).op("set_cache", key)?;
        let size_bytes = text.len() as u64;
        let now = self.now();
        let now_ms = now.timestamp_millis();
        let expires_ms = expiry_millis(now, ttl.unwrap_or(self.config().cache_default_ttl));
        let policy = EvictionPolicy::from_config(self.config());

        let evicted = self
            .with_tx(|tx| {
                let candidates = load_candidates(tx, key)?;
                let doomed = plan_eviction(candidates, size_bytes, &policy);
                for doomed_key in &doomed {
                    tx.execute("DELETE FROM cache WHERE key = ?1", params![doomed_key])?;
                }

                tx.execute(
                    "INSERT INTO cache (key, value, size_bytes, expires_at, last_accessed)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(key) DO UPDATE SET
                         value = excluded.value,
                         size_bytes = excluded.size_bytes,
                         expires_at = excluded.expires_at,
                         last_accessed = excluded.last_accessed",
                    params![key, text, size_bytes as i64, expires_ms, now_ms],
                )?;
                Ok(doomed.len())
            })
            .await
            .op("set_cache", key)?;

        if evicted > 0 {
            tracing::debug!(key, evicted, "cache eviction pass");
        }
        Ok(())
    }

    pub async fn delete_cache(&self, key: &str) -> Result<bool> {
        self.with_tx(|tx| {
            let affected = tx.execute("DELETE FROM cache WHERE key = ?1", params![key])?;
            Ok(affected > 0)
        })
        .await
        .op("delete_cache", key)
    }

    pub async fn clear_cache(&self) -> Result<usize> {
        self.with_tx(|tx| Ok(tx.execute("DELETE FROM cache", [])?))
            .await
            .op("clear_cache", "*")
    }

    /// Same visibility as [`get_cache`](Self::get_cache), including the LRU
    /// touch, without decoding the value.
    pub async fn has_cache(&self, key: &str) -> Result<bool> {
        let now_ms = self.now().timestamp_millis();

        self.with_tx(|tx| {
            let touched = tx.execute(
                "UPDATE cache SET last_accessed = ?2 WHERE key = ?1 AND expires_at >= ?2",
                params![key, now_ms],
            )?;
            Ok(touched > 0)
        })
        .await
        .op("has_cache", key)
    }

    /// Physical occupancy of the cache region, expired rows included.
    pub async fn cache_stats(&self) -> Result<CacheStats> {
        self.with_tx(|tx| {
            let (entries, total_bytes): (i64, i64) = tx.query_row(
                "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM cache",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(CacheStats {
                entries: entries.max(0) as u64,
                total_bytes: total_bytes.max(0) as u64,
            })
        })
        .await
        .op("cache_stats", "*")
    }
}

// every stored row except the one about to be overwritten
fn load_candidates(tx: &Transaction<'_>, replacing: &str) -> Result<Vec<EvictionCandidate>> {
    let mut stmt =
        tx.prepare("SELECT key, size_bytes, last_accessed FROM cache WHERE key != ?1")?;
    let rows = stmt.query_map(params![replacing], |row| {
        let size_bytes: i64 = row.get(1)?;
        Ok(EvictionCandidate {
            key: row.get(0)?,
            size_bytes: size_bytes.max(0) as u64,
            last_accessed: row.get(2)?,
        })
    })?;

    let mut candidates = Vec::new();
    for row in rows {
        candidates.push(row?);
    }
    Ok(candidates)
}
