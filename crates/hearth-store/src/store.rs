//! The shared store handle.
//!
//! [`PersistentStore`] is cheap to clone; every clone talks to the same
//! [`Database`] behind an async mutex.  Each public operation runs as one
//! SQLite transaction, so a failure part-way through leaves nothing behind.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Transaction};
use tokio::sync::Mutex;

use crate::clock::{ttl_millis, Clock, SystemClock};
use crate::config::StoreConfig;
use crate::database::Database;
use crate::error::{OpContext, Result, StorageError};
use crate::models::PurgeStats;

#[derive(Clone)]
pub struct PersistentStore {
    db: Arc<Mutex<Option<Database>>>,
    config: Arc<StoreConfig>,
    clock: Arc<dyn Clock>,
}

impl PersistentStore {
    /// Wrap an already opened database.
    pub fn new(db: Database, config: StoreConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(Some(db))),
            config: Arc::new(config),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source (tests use [`ManualClock`](crate::ManualClock)).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn open_at(path: &Path, config: StoreConfig) -> Result<Self> {
        Ok(Self::new(Database::open_at(path)?, config))
    }

    pub fn open_default(config: StoreConfig) -> Result<Self> {
        Ok(Self::new(Database::open_default()?, config))
    }

    pub fn open_in_memory(config: StoreConfig) -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?, config))
    }

    /// Drop the connection.  Every clone of this handle fails with
    /// [`StorageError::Closed`] afterwards.
    pub async fn close(&self) {
        if self.db.lock().await.take().is_some() {
            tracing::info!("store closed");
        }
    }

    pub async fn is_open(&self) -> bool {
        self.db.lock().await.is_some()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run `f` inside one transaction.  Dropping the transaction on error
    /// rolls it back.
    pub(crate) async fn with_tx<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut guard = self.db.lock().await;
        let db = guard.as_mut().ok_or(StorageError::Closed)?;
        let tx = db.conn_mut().transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Physically delete every logically expired session, message and cache
    /// entry.  Reads already hide expired records, so this is housekeeping only.
    pub async fn purge_expired(&self) -> Result<PurgeStats> {
        let now_ms = self.now().timestamp_millis();
        let stats = self
            .with_tx(|tx| {
                Ok(PurgeStats {
                    sessions: tx.execute(
                        "DELETE FROM sessions WHERE expires_at < ?1",
                        params![now_ms],
                    )?,
                    messages: tx.execute(
                        "DELETE FROM messages WHERE expires_at < ?1",
                        params![now_ms],
                    )?,
                    cache_entries: tx
                        .execute("DELETE FROM cache WHERE expires_at < ?1", params![now_ms])?,
                })
            })
            .await
            .op("purge_expired", "*")?;

        tracing::debug!(
            sessions = stats.sessions,
            messages = stats.messages,
            cache_entries = stats.cache_entries,
            "purged expired records"
        );
        Ok(stats)
    }
}

/// `now + ttl` in unix milliseconds.
pub(crate) fn expiry_millis(now: DateTime<Utc>, ttl: std::time::Duration) -> i64 {
    now.timestamp_millis().saturating_add(ttl_millis(ttl))
}
