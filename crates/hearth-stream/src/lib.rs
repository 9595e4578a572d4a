//! Streaming transport for the Hearth chat client.
//!
//! Keeps one live WebSocket per chat session: reconnects with exponential
//! backoff, checks liveness with a ping/pong heartbeat, queues outbound
//! frames while offline, and turns inbound frames into typed
//! [`StreamEvent`]s with backpressure during token floods.

pub mod backoff;
pub mod config;
pub mod connector;
pub mod events;
pub mod memory;
pub mod pipeline;
pub mod state;
pub mod transport;

mod error;

pub use config::TransportConfig;
pub use connector::{Connector, Incoming, Link, WsConnector};
pub use error::{Result, TransportError};
pub use events::{EventBus, EventKind, HandlerId, StreamEvent};
pub use state::{ConnectionStatus, HealthReport, StreamState};
pub use transport::StreamTransport;
