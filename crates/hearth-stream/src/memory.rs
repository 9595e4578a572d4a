//! An in-process stand-in for the chat backend.
//!
//! [`memory_pair`] returns a [`MemoryConnector`] to hand to the transport and
//! a [`MemoryServer`] that accepts its connections.  Each accepted connection
//! is a [`ServerEnd`] that can push frames to the client, read what the
//! client sent, or hang up.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc as fmpsc;
use futures::{SinkExt, StreamExt};
use hearth_shared::ServerFrame;
use tokio::sync::mpsc;

use crate::connector::{Connector, Incoming, Link};
use crate::error::{Result, TransportError};

#[derive(Debug, Default)]
struct Shared {
    refuse: AtomicBool,
    attempts: AtomicUsize,
}

pub fn memory_pair() -> (MemoryConnector, MemoryServer) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared::default());
    (
        MemoryConnector {
            accept_tx,
            shared: shared.clone(),
        },
        MemoryServer { accept_rx, shared },
    )
}

#[derive(Debug, Clone)]
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<ServerEnd>,
    shared: Arc<Shared>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<Link> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);
        if self.shared.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Connect(format!("connection to `{url}` refused")));
        }

        let (to_client, inbound) = fmpsc::unbounded::<Incoming>();
        let (outbound, from_client) = fmpsc::unbounded::<String>();

        self.accept_tx
            .send(ServerEnd {
                url: url.to_string(),
                to_client,
                from_client,
            })
            .map_err(|_| TransportError::Closed)?;

        Ok(Link {
            outbound: Box::pin(outbound.sink_map_err(|e| TransportError::Send(e.to_string()))),
            inbound: inbound.boxed(),
        })
    }
}

#[derive(Debug)]
pub struct MemoryServer {
    accept_rx: mpsc::UnboundedReceiver<ServerEnd>,
    shared: Arc<Shared>,
}

impl MemoryServer {
    /// Wait for the next connection.
    pub async fn accept(&mut self) -> Option<ServerEnd> {
        self.accept_rx.recv().await
    }

    /// Make subsequent connection attempts fail (or succeed again).
    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Connection attempts seen so far, refused ones included.
    pub fn attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

/// Server side of one accepted connection.  Dropping it ends the client's
/// inbound stream without a close frame.
#[derive(Debug)]
pub struct ServerEnd {
    url: String,
    to_client: fmpsc::UnboundedSender<Incoming>,
    from_client: fmpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    /// The URL the client dialled.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn send_frame(&self, frame: &ServerFrame) {
        match serde_json::to_string(frame) {
            Ok(text) => self.send_text(text),
            Err(e) => tracing::warn!(error = %e, "could not encode server frame"),
        }
    }

    /// Push raw text, well-formed or not.
    pub fn send_text(&self, text: impl Into<String>) {
        // a closed client is not the server's problem
        let _ = self.to_client.unbounded_send(Incoming::Text(text.into()));
    }

    /// Send a close frame and hang up.
    pub fn close(self, code: u16, reason: &str) {
        let _ = self.to_client.unbounded_send(Incoming::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    /// Next text the client sent; `None` once the client dropped the link.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.next().await
    }
}
