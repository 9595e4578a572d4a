use hearth_shared::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the streaming transport.
///
/// Socket failures inside the running transport never reach callers as
/// errors; they drive the reconnect state machine and show up as
/// `disconnected` events.  Callers only see these from the handle methods.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Opening the socket failed.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Writing a frame to an open socket failed.
    #[error("Send failed: {0}")]
    Send(String),

    /// The remote end is gone.
    #[error("Connection closed")]
    Closed,

    /// Malformed frame.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The pending queue already holds the configured maximum.
    #[error("Pending queue is full ({0} messages)")]
    QueueFull(usize),

    /// The transport task has stopped.
    #[error("Transport has shut down")]
    Shutdown,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TransportError>;
