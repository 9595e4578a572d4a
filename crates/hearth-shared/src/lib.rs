//! # hearth-shared
//!
//! Types shared by the Hearth storage and streaming crates: the JSON wire
//! envelopes exchanged with the chat backend, the protocol error type, and
//! the default limits and timings.

pub mod constants;
pub mod error;
pub mod protocol;

pub use error::ProtocolError;
pub use protocol::{ClientFrame, ServerFrame};
