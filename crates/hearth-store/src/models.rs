//! Domain model structs persisted in the local SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to a UI layer.  Fields stamped by the store itself (`expires_at`,
//! `last_accessed`) are `Option`s: callers leave them `None` and the store
//! fills them in on write.
//!
//! Timestamps are kept at millisecond precision, the resolution of the
//! database columns.  The constructors cut their `now` argument with
//! [`to_millis`], and the records returned by the `save_*` operations are cut
//! the same way, so a saved record compares equal to what a later read
//! returns.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::to_millis;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A chat session.  Owns zero or more messages by `session_id` reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// Opaque unique identifier.
    pub id: String,
    /// Human-readable session name.
    pub name: String,
    /// Optional system prompt the backend should use for this session.
    pub system_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Write time + session TTL.  Set by the store.
    pub expires_at: Option<DateTime<Utc>>,
    /// Last read or write.  Set by the store.
    pub last_accessed: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        let now = to_millis(now);
        Self {
            id: id.into(),
            name: name.into(),
            system_prompt: None,
            created_at: now,
            updated_at: now,
            expires_at: None,
            last_accessed: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Delivery state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Sending,
    Streaming,
    Complete,
    Error,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Streaming => "streaming",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sending" => Ok(Self::Sending),
            "streaming" => Ok(Self::Streaming),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// A stored enum column held a value this build does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant `{}`", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    /// The session this message belongs to (back-reference, not ownership).
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub status: MessageStatus,
    /// Accumulator for an in-flight assistant response; empty once complete.
    pub streaming_content: String,
    /// Token count reported by the backend, when known.
    pub token_count: Option<u64>,
    pub created_at: DateTime<Utc>,
    /// Write time + message TTL.  Set by the store.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        session_id: impl Into<String>,
        role: Role,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.into(),
            role,
            content: content.into(),
            status: MessageStatus::Pending,
            streaming_content: String::new(),
            token_count: None,
            created_at: to_millis(now),
            expires_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Attachment
// ---------------------------------------------------------------------------

/// Metadata for a file attached to a message.  Lives until deleted explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub id: String,
    pub message_id: String,
    /// Original file name.
    pub filename: String,
    /// MIME type or extension.
    pub file_type: String,
    /// File size in bytes.
    pub file_size: i64,
    /// Content hash used for de-duplication, when computed.
    pub content_hash: Option<String>,
    /// Where the file body is kept, if it is kept at all.
    pub storage_path: Option<String>,
    /// Text pulled out of the file for use as model context.
    pub extracted_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Size and occupancy of the cache region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: u64,
    pub total_bytes: u64,
}

/// Physical records removed by [`PersistentStore::purge_expired`](crate::PersistentStore::purge_expired).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeStats {
    pub sessions: usize,
    pub messages: usize,
    pub cache_entries: usize,
}
