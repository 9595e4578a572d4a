//! How the transport obtains a socket.
//!
//! [`Connector`] is the seam between the transport state machine and the
//! network.  [`WsConnector`] dials real WebSocket endpoints; the in-memory
//! connector in [`crate::memory`] stands in for a server in tests.

use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{future, Sink, SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

use crate::error::{Result, TransportError};

/// Close code reported when the socket vanished without a close frame.
pub const ABNORMAL_CLOSE: u16 = 1006;

/// One item read from a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Text(String),
    Binary(Vec<u8>),
    /// The peer closed the connection, or the socket failed.
    Closed { code: u16, reason: String },
}

pub type OutboundSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// An open connection, split into its two directions.  Dropping it closes
/// the socket.
pub struct Link {
    pub outbound: OutboundSink,
    pub inbound: BoxStream<'static, Incoming>,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection to `url`.
    async fn connect(&self, url: &str) -> Result<Link>;
}

/// Dials `ws://` and `wss://` URLs with tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Link> {
        let (socket, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(format!("failed to connect to `{url}`: {e}")))?;
        tracing::debug!(url, "websocket handshake complete");

        let (write, read) = socket.split();

        let outbound = write
            .with(|text: String| future::ready(Ok::<_, WsError>(WsMessage::Text(text))))
            .sink_map_err(|e| TransportError::Send(e.to_string()));

        let inbound = read
            .filter_map(|message| {
                future::ready(match message {
                    Ok(WsMessage::Text(text)) => Some(Incoming::Text(text)),
                    Ok(WsMessage::Binary(bytes)) => Some(Incoming::Binary(bytes)),
                    // tungstenite answers pings on its own
                    Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) | Ok(WsMessage::Frame(_)) => {
                        None
                    }
                    Ok(WsMessage::Close(frame)) => Some(match frame {
                        Some(frame) => Incoming::Closed {
                            code: u16::from(frame.code),
                            reason: frame.reason.into_owned(),
                        },
                        None => Incoming::Closed {
                            code: u16::from(CloseCode::Status),
                            reason: String::new(),
                        },
                    }),
                    Err(e) => Some(Incoming::Closed {
                        code: ABNORMAL_CLOSE,
                        reason: e.to_string(),
                    }),
                })
            })
            .boxed();

        Ok(Link {
            outbound: Box::pin(outbound),
            inbound,
        })
    }
}
