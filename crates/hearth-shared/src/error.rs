use thiserror::Error;

/// A malformed or unexpected frame on the streaming wire.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Invalid JSON, a missing field, or an unknown `type` tag.
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A frame that cannot be turned into a request (never expected in practice).
    #[error("Failed to encode frame: {0}")]
    Encode(String),
}
