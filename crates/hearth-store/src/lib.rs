//! # hearth-store
//!
//! Durable local storage for the Hearth chat client, backed by SQLite.
//!
//! Sessions and messages expire a fixed time after their last write.  The
//! cache region holds JSON values with a per-entry TTL and is kept under a
//! count and a size bound by approximate LRU eviction.  Attachments live
//! until deleted.
//!
//! Every operation is async and runs as a single transaction on the shared
//! [`PersistentStore`] handle.  Expired records are hidden from reads right
//! away and physically removed by [`PersistentStore::purge_expired`].

pub mod clock;
pub mod config;
pub mod database;
pub mod eviction;
pub mod migrations;
pub mod models;

mod attachments;
mod cache;
mod error;
mod messages;
mod rows;
mod sessions;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use database::Database;
pub use error::{Result, StorageError};
pub use models::*;
pub use store::PersistentStore;
