use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Lifecycle of the single live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// Snapshot of the in-flight assistant turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamState {
    /// Session the transport is (or wants to be) connected to.
    pub session_id: Option<String>,
    /// Set while an assistant turn is mid-flight.
    pub message_id: Option<String>,
    /// Cumulative content reported by the server.
    pub content: String,
    pub token_count: u64,
    /// Fragments received but not yet forwarded.
    pub buffered_tokens: usize,
    pub backpressure_active: bool,
    pub last_token_at: Option<Instant>,
}

impl StreamState {
    pub fn is_streaming(&self) -> bool {
        self.message_id.is_some()
    }

    /// Drop the turn, keep the session.
    pub(crate) fn reset_turn(&mut self) {
        self.message_id = None;
        self.content.clear();
        self.token_count = 0;
        self.buffered_tokens = 0;
        self.backpressure_active = false;
        self.last_token_at = None;
    }
}

/// Result of [`StreamTransport::check_connection_health`](crate::StreamTransport::check_connection_health).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    /// `false` only when a stream is active and no token arrived for longer
    /// than the stale threshold.  Advisory: the transport does not act on it.
    pub healthy: bool,
    pub status: ConnectionStatus,
    pub streaming: bool,
    pub since_last_token: Option<Duration>,
}

impl HealthReport {
    pub(crate) fn assess(state: &StreamState, status: ConnectionStatus, stale_after: Duration) -> Self {
        let streaming = state.is_streaming();
        let since_last_token = state.last_token_at.map(|at| at.elapsed());
        let stale = streaming && since_last_token.is_some_and(|elapsed| elapsed > stale_after);

        Self {
            healthy: !stale,
            status,
            streaming,
            since_last_token,
        }
    }
}
