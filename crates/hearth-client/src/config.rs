//! Client configuration loaded from environment variables.
//!
//! Every setting has a default, so the client starts with no configuration
//! against a backend on localhost.

use std::path::PathBuf;
use std::str::FromStr;

use hearth_store::StoreConfig;
use hearth_stream::TransportConfig;

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// SQLite file.  `None` uses the platform data directory.
    /// Env: `HEARTH_DB_PATH`
    pub db_path: Option<PathBuf>,

    /// Retention and cache limits.
    /// Env: `HEARTH_CACHE_MAX_ENTRIES`, `HEARTH_CACHE_MAX_BYTES`
    pub store: StoreConfig,

    /// Backend URL and streaming tunables.
    /// Env: `HEARTH_SERVER_URL`, `HEARTH_BACKPRESSURE_THRESHOLD`,
    /// `HEARTH_MAX_PENDING`
    pub transport: TransportConfig,
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("HEARTH_SERVER_URL") {
            config.transport.base_url = url;
        }

        if let Some(path) = lookup("HEARTH_DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Some(n) = parse_var(&lookup, "HEARTH_CACHE_MAX_ENTRIES") {
            config.store.cache_max_entries = n;
        }

        if let Some(n) = parse_var(&lookup, "HEARTH_CACHE_MAX_BYTES") {
            config.store.cache_max_bytes = n;
        }

        if let Some(n) = parse_var::<usize>(&lookup, "HEARTH_BACKPRESSURE_THRESHOLD") {
            if n == 0 {
                tracing::warn!("HEARTH_BACKPRESSURE_THRESHOLD must be positive, using default");
            } else {
                config.transport.backpressure_threshold = n;
            }
        }

        // 0 = unbounded
        if let Some(n) = parse_var::<usize>(&lookup, "HEARTH_MAX_PENDING") {
            config.transport.max_pending = (n > 0).then_some(n);
        }

        config
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> ClientConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_env() {
        let config = from_pairs(&[]);
        assert_eq!(config.transport.base_url, "ws://127.0.0.1:8765");
        assert_eq!(config.store.cache_max_entries, 1000);
        assert_eq!(config.transport.max_pending, None);
        assert!(config.db_path.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = from_pairs(&[
            ("HEARTH_SERVER_URL", "ws://10.0.0.2:9000"),
            ("HEARTH_DB_PATH", "/tmp/hearth.db"),
            ("HEARTH_CACHE_MAX_ENTRIES", "50"),
            ("HEARTH_CACHE_MAX_BYTES", "4096"),
            ("HEARTH_BACKPRESSURE_THRESHOLD", "8"),
            ("HEARTH_MAX_PENDING", "16"),
        ]);
        assert_eq!(config.transport.base_url, "ws://10.0.0.2:9000");
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/hearth.db")));
        assert_eq!(config.store.cache_max_entries, 50);
        assert_eq!(config.store.cache_max_bytes, 4096);
        assert_eq!(config.transport.backpressure_threshold, 8);
        assert_eq!(config.transport.max_pending, Some(16));
    }

    #[test]
    fn bad_values_fall_back() {
        let config = from_pairs(&[
            ("HEARTH_CACHE_MAX_ENTRIES", "lots"),
            ("HEARTH_BACKPRESSURE_THRESHOLD", "0"),
            ("HEARTH_MAX_PENDING", "0"),
        ]);
        assert_eq!(config.store.cache_max_entries, 1000);
        assert_eq!(config.transport.backpressure_threshold, 100);
        assert_eq!(config.transport.max_pending, None);
    }
}
