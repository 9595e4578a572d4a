//! # hearth-client
//!
//! Composition root of the Hearth chat client: configuration, logging, and
//! the [`AppContext`] that owns the store and the streaming transport.

pub mod config;
pub mod recorder;
pub mod state;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::ClientConfig;
pub use state::AppContext;

/// Install the global tracing subscriber.  `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("hearth_client=debug,hearth_stream=debug,hearth_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
