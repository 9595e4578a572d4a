use std::time::Duration;

use hearth_shared::constants::{
    BACKPRESSURE_THRESHOLD, DEFAULT_SERVER_URL, HEARTBEAT_INTERVAL_SECS, PONG_TIMEOUT_SECS,
    QUEUED_SEND_DELAY_MS, RECONNECT_INITIAL_DELAY_MS, RECONNECT_MAX_DELAY_MS,
    STALE_STREAM_SECS, STREAM_PATH_PREFIX,
};

/// Tunables for [`StreamTransport`](crate::StreamTransport).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Scheme, host and port of the backend, e.g. `ws://127.0.0.1:8765`.
    pub base_url: String,
    /// Buffered fragment count that raises backpressure.  Twice this value
    /// force-flushes the buffer.
    pub backpressure_threshold: usize,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    pub heartbeat_interval: Duration,
    /// How long a ping may go unanswered.
    pub pong_timeout: Duration,
    /// Gap between consecutive sends when draining the pending queue.
    pub queued_send_delay: Duration,
    /// Time without a token after which an active stream is reported stale.
    pub stale_after: Duration,
    /// Upper bound on queued outbound frames.  `None` queues without limit.
    pub max_pending: Option<usize>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVER_URL.to_string(),
            backpressure_threshold: BACKPRESSURE_THRESHOLD,
            reconnect_initial: Duration::from_millis(RECONNECT_INITIAL_DELAY_MS),
            reconnect_max: Duration::from_millis(RECONNECT_MAX_DELAY_MS),
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            pong_timeout: Duration::from_secs(PONG_TIMEOUT_SECS),
            queued_send_delay: Duration::from_millis(QUEUED_SEND_DELAY_MS),
            stale_after: Duration::from_secs(STALE_STREAM_SECS),
            max_pending: None,
        }
    }
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Streaming endpoint of one session.
    pub fn endpoint(&self, session_id: &str) -> String {
        format!(
            "{}{}{}",
            self.base_url.trim_end_matches('/'),
            STREAM_PATH_PREFIX,
            session_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_session_scoped() {
        let config = TransportConfig::new("ws://localhost:8000/");
        assert_eq!(config.endpoint("abc"), "ws://localhost:8000/api/v1/ws/abc");
        assert_eq!(
            TransportConfig::default().endpoint("s1"),
            "ws://127.0.0.1:8765/api/v1/ws/s1"
        );
    }
}
