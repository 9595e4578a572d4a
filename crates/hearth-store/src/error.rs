use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StorageError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A cache value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// The store was closed by its owner.
    #[error("Store is closed")]
    Closed,

    /// A failed public operation, tagged with what was being done and to what.
    #[error("{op} failed for `{key}`: {source}")]
    Operation {
        op: &'static str,
        key: String,
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    /// Name of the failed operation, if this error came from one.
    pub fn op(&self) -> Option<&'static str> {
        match self {
            Self::Operation { op, .. } => Some(op),
            _ => None,
        }
    }
}

/// Attach the operation name and key/id to a low-level failure.
pub(crate) trait OpContext<T> {
    fn op(self, op: &'static str, key: &str) -> Result<T>;
}

impl<T, E> OpContext<T> for std::result::Result<T, E>
where
    E: Into<StorageError>,
{
    fn op(self, op: &'static str, key: &str) -> Result<T> {
        self.map_err(|e| {
            let source = e.into();
            tracing::warn!(op, key, error = %source, "storage operation failed");
            StorageError::Operation {
                op,
                key: key.to_string(),
                source: Box::new(source),
            }
        })
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StorageError>;
