/// Application name
pub const APP_NAME: &str = "Hearth";

/// Path prefix of the per-session streaming endpoint; the session id is appended.
pub const STREAM_PATH_PREFIX: &str = "/api/v1/ws/";

/// Default base URL of the locally hosted chat backend
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:8765";

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Session and message time-to-live (30 days)
pub const SESSION_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Default cache entry time-to-live (24 hours)
pub const CACHE_DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;

/// Upper bound on the total serialized size of the cache region (50 MiB)
pub const CACHE_MAX_BYTES: u64 = 50 * 1024 * 1024;

/// Upper bound on the number of cache entries
pub const CACHE_MAX_ENTRIES: u64 = 1000;

/// Share of the cache (by count and by size) removed by one eviction pass
pub const CACHE_EVICTION_FRACTION: f64 = 0.2;

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

/// Buffered token count at which backpressure is signalled. Twice this value
/// triggers a force-flush.
pub const BACKPRESSURE_THRESHOLD: usize = 100;

/// First reconnect delay in milliseconds
pub const RECONNECT_INITIAL_DELAY_MS: u64 = 1_000;

/// Reconnect delay ceiling in milliseconds
pub const RECONNECT_MAX_DELAY_MS: u64 = 30_000;

/// Keepalive ping interval in seconds
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// How long a ping may go unanswered before the connection is dropped
pub const PONG_TIMEOUT_SECS: u64 = 5;

/// Delay between consecutive sends when draining the pending queue
pub const QUEUED_SEND_DELAY_MS: u64 = 10;

/// A stream with no token for this long is reported as unhealthy
pub const STALE_STREAM_SECS: u64 = 60;
