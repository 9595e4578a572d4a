//! The streaming transport.
//!
//! One tokio task (the actor) owns the socket, the pending queue, the token
//! pipeline and every timer.  [`StreamTransport`] is a cheap handle that talks
//! to it over an mpsc command channel and reads a shared snapshot for the
//! synchronous getters.  Event handlers run on the actor task, so state
//! changes and dispatch never interleave.

use std::collections::VecDeque;
use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, StreamExt};
use hearth_shared::{ClientFrame, ProtocolError, ServerFrame};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Instant, Sleep};

use crate::backoff::ReconnectBackoff;
use crate::config::TransportConfig;
use crate::connector::{Connector, Incoming, Link, WsConnector, ABNORMAL_CLOSE};
use crate::error::{Result, TransportError};
use crate::events::{EventBus, EventKind, HandlerId, StreamEvent};
use crate::pipeline::TokenPipeline;
use crate::state::{ConnectionStatus, HealthReport, StreamState};

/// Close code reported after an explicit [`StreamTransport::disconnect`].
pub const NORMAL_CLOSE: u16 = 1000;

const COMMAND_BUFFER: usize = 64;

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Command {
    Connect {
        session_id: String,
        done: oneshot::Sender<()>,
    },
    Disconnect {
        done: oneshot::Sender<()>,
    },
    Send {
        frame: ClientFrame,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

#[derive(Debug, Default)]
struct Snapshot {
    status: ConnectionStatus,
    stream: StreamState,
}

/// Handle to one streaming connection.  Clones share the connection.
///
/// The actor stops when [`shutdown`](Self::shutdown) is called or every
/// handle is dropped.
#[derive(Clone)]
pub struct StreamTransport {
    commands: mpsc::Sender<Command>,
    bus: Arc<EventBus>,
    snapshot: Arc<Mutex<Snapshot>>,
    config: Arc<TransportConfig>,
}

impl StreamTransport {
    /// Spawn the transport task.  Must be called inside a tokio runtime.
    pub fn new(config: TransportConfig, connector: Arc<dyn Connector>) -> Self {
        let config = Arc::new(config);
        let bus = Arc::new(EventBus::new());
        let snapshot = Arc::new(Mutex::new(Snapshot::default()));
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);

        let actor = Actor {
            pipeline: TokenPipeline::new(config.backpressure_threshold),
            backoff: ReconnectBackoff::new(config.reconnect_initial, config.reconnect_max),
            config: config.clone(),
            connector,
            bus: bus.clone(),
            snapshot: snapshot.clone(),
            status: ConnectionStatus::Disconnected,
            queue: VecDeque::new(),
            link: None,
            connecting: None,
            reconnect_at: None,
            heartbeat_at: None,
            pong_deadline: None,
            flush_at: None,
        };
        tokio::spawn(actor.run(command_rx));

        Self {
            commands,
            bus,
            snapshot,
            config,
        }
    }

    /// Transport that dials real WebSocket endpoints.
    pub fn websocket(config: TransportConfig) -> Self {
        Self::new(config, Arc::new(WsConnector))
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Open a connection for `session_id`, replacing any current one.  Returns
    /// once the attempt has started; watch for [`StreamEvent::Connected`].
    pub async fn connect(&self, session_id: impl Into<String>) -> Result<()> {
        let session_id = session_id.into();
        self.request(|done| Command::Connect { session_id, done })
            .await
    }

    /// Close the connection, forget the session and drop queued frames.  No
    /// reconnect fires afterwards.
    pub async fn disconnect(&self) -> Result<()> {
        self.request(|done| Command::Disconnect { done }).await
    }

    /// Start a user turn.  Sent now if connected, queued otherwise.
    pub async fn send_send_message(
        &self,
        session_id: &str,
        message: &str,
        stream: bool,
    ) -> Result<()> {
        self.send_frame(ClientFrame::SendMessage {
            session_id: session_id.to_string(),
            message: message.to_string(),
            stream,
        })
        .await
    }

    pub async fn send_cancel_stream(&self, session_id: &str, message_id: &str) -> Result<()> {
        self.send_frame(ClientFrame::CancelStream {
            session_id: session_id.to_string(),
            message_id: message_id.to_string(),
        })
        .await
    }

    pub async fn send_get_status(&self, session_id: &str) -> Result<()> {
        self.send_frame(ClientFrame::GetStatus {
            session_id: session_id.to_string(),
        })
        .await
    }

    /// Send or queue any outbound frame.  Fails only when the queue is full
    /// or the transport has shut down.
    pub async fn send_frame(&self, frame: ClientFrame) -> Result<()> {
        self.request(|reply| Command::Send { frame, reply }).await?
    }

    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&StreamEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bus.on(kind, handler)
    }

    pub fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        self.bus.off(kind, id)
    }

    pub fn is_connected(&self) -> bool {
        self.get_connection_status() == ConnectionStatus::Connected
    }

    /// `true` while an assistant turn is mid-flight.
    pub fn is_streaming(&self) -> bool {
        self.lock().stream.is_streaming()
    }

    pub fn get_connection_status(&self) -> ConnectionStatus {
        self.lock().status
    }

    /// A copy of the current turn state.
    pub fn get_stream_state(&self) -> StreamState {
        self.lock().stream.clone()
    }

    pub fn check_connection_health(&self) -> HealthReport {
        let snapshot = self.lock();
        HealthReport::assess(&snapshot.stream, snapshot.status, self.config.stale_after)
    }

    /// Disconnect and stop the transport task.  Later calls on any handle
    /// fail with [`TransportError::Shutdown`].
    pub async fn shutdown(&self) {
        if self.request(|done| Command::Shutdown { done }).await.is_err() {
            tracing::debug!("transport already shut down");
        }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| TransportError::Shutdown)?;
        rx.await.map_err(|_| TransportError::Shutdown)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("status", &self.get_connection_status())
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

type Timer = Option<Pin<Box<Sleep>>>;

struct Actor {
    config: Arc<TransportConfig>,
    connector: Arc<dyn Connector>,
    bus: Arc<EventBus>,
    snapshot: Arc<Mutex<Snapshot>>,

    status: ConnectionStatus,
    pipeline: TokenPipeline,
    backoff: ReconnectBackoff,
    queue: VecDeque<ClientFrame>,

    link: Option<Link>,
    connecting: Option<BoxFuture<'static, Result<Link>>>,

    reconnect_at: Timer,
    heartbeat_at: Timer,
    pong_deadline: Timer,
    flush_at: Timer,
}

impl Actor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { done }) => {
                        self.drop_session().await;
                        let _ = done.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.drop_session().await;
                        break;
                    }
                },
                result = next_output(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connect_result(result).await;
                }
                item = next_incoming(&mut self.link) => self.on_incoming(item).await,
                () = fire(&mut self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.on_reconnect_due();
                }
                () = fire(&mut self.heartbeat_at) => {
                    self.heartbeat_at = None;
                    self.on_heartbeat().await;
                }
                () = fire(&mut self.pong_deadline) => {
                    self.pong_deadline = None;
                    tracing::warn!("heartbeat timed out, dropping connection");
                    self.connection_lost(ABNORMAL_CLOSE, "heartbeat timeout".to_string());
                }
                () = fire(&mut self.flush_at) => {
                    self.flush_at = None;
                    self.flush_queue().await;
                }
            }
            self.publish();
        }

        tracing::debug!("transport task stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { session_id, done } => {
                self.begin_session(session_id);
                self.publish();
                let _ = done.send(());
            }
            Command::Disconnect { done } => {
                self.drop_session().await;
                self.publish();
                let _ = done.send(());
            }
            Command::Send { frame, reply } => {
                let result = self.submit(frame).await;
                let _ = reply.send(result);
            }
            // handled by the run loop
            Command::Shutdown { done } => {
                let _ = done.send(());
            }
        }
    }

    // -- lifecycle ----------------------------------------------------------

    fn begin_session(&mut self, session_id: String) {
        if self.link.take().is_some() {
            tracing::debug!("replacing existing connection");
        }
        self.connecting = None;
        self.cancel_timers();
        self.reconnect_at = None;

        if self.pipeline.state().session_id.as_deref() != Some(session_id.as_str()) {
            let events = self.pipeline.abandon_turn();
            self.emit_all(events);
        }
        self.pipeline.set_session(Some(session_id.clone()));
        self.backoff.reset();
        self.start_connecting(session_id);
    }

    fn start_connecting(&mut self, session_id: String) {
        let url = self.config.endpoint(&session_id);
        tracing::info!(session_id = %session_id, %url, "connecting");

        self.status = ConnectionStatus::Connecting;
        let connector = self.connector.clone();
        self.connecting = Some(Box::pin(async move { connector.connect(&url).await }));
    }

    async fn on_connect_result(&mut self, result: Result<Link>) {
        match result {
            Ok(link) => {
                self.link = Some(link);
                self.status = ConnectionStatus::Connected;
                self.backoff.reset();
                self.heartbeat_at = Some(Box::pin(sleep(self.config.heartbeat_interval)));
                tracing::info!(
                    session_id = ?self.pipeline.state().session_id,
                    queued = self.queue.len(),
                    "connected"
                );
                self.emit_all(vec![StreamEvent::Connected]);
                self.flush_queue().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "connection attempt failed");
                self.status = ConnectionStatus::Disconnected;
                self.emit_all(vec![StreamEvent::Disconnected {
                    code: ABNORMAL_CLOSE,
                    reason: e.to_string(),
                }]);
                self.schedule_reconnect();
            }
        }
    }

    /// The socket went away without the client asking for it.
    fn connection_lost(&mut self, code: u16, reason: String) {
        self.link = None;
        self.connecting = None;
        self.cancel_timers();
        self.status = ConnectionStatus::Disconnected;
        tracing::info!(code, %reason, "connection closed");

        let mut events = self.pipeline.end_burst();
        events.push(StreamEvent::Disconnected { code, reason });
        self.emit_all(events);
        self.schedule_reconnect();
    }

    async fn drop_session(&mut self) {
        let had_connection = self.link.is_some() || self.connecting.is_some();

        if let Some(mut link) = self.link.take() {
            match tokio::time::timeout(self.config.pong_timeout, link.outbound.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(error = %e, "close handshake failed"),
                Err(_) => tracing::debug!("close handshake timed out"),
            }
        }
        self.connecting = None;
        self.cancel_timers();
        self.reconnect_at = None;

        let dropped = self.queue.len();
        self.queue.clear();
        self.status = ConnectionStatus::Disconnected;

        let mut events = self.pipeline.abandon_turn();
        self.pipeline.set_session(None);
        if had_connection {
            events.push(StreamEvent::Disconnected {
                code: NORMAL_CLOSE,
                reason: "client disconnect".to_string(),
            });
        }
        tracing::info!(dropped_queued = dropped, "disconnected");
        self.emit_all(events);
    }

    fn schedule_reconnect(&mut self) {
        if self.pipeline.state().session_id.is_none() {
            return;
        }
        let delay = self.backoff.next_delay();
        tracing::info!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        self.reconnect_at = Some(Box::pin(sleep(delay)));
    }

    fn on_reconnect_due(&mut self) {
        if self.link.is_some() || self.connecting.is_some() {
            return;
        }
        if let Some(session_id) = self.pipeline.state().session_id.clone() {
            self.start_connecting(session_id);
        }
    }

    fn cancel_timers(&mut self) {
        self.heartbeat_at = None;
        self.pong_deadline = None;
        self.flush_at = None;
    }

    // -- outbound -----------------------------------------------------------

    async fn submit(&mut self, frame: ClientFrame) -> Result<()> {
        if self.status == ConnectionStatus::Connected && self.queue.is_empty() {
            self.deliver(frame).await;
            return Ok(());
        }

        if let Some(max) = self.config.max_pending {
            if self.queue.len() >= max {
                tracing::warn!(max, "pending queue full, rejecting frame");
                return Err(TransportError::QueueFull(max));
            }
        }

        self.queue.push_back(frame);
        tracing::debug!(queued = self.queue.len(), "frame queued");
        if self.status == ConnectionStatus::Connected && self.flush_at.is_none() {
            self.flush_at = Some(Box::pin(sleep(self.config.queued_send_delay)));
        }
        Ok(())
    }

    /// Send the head of the queue, then wait `queued_send_delay` before the
    /// next one.
    async fn flush_queue(&mut self) {
        if self.status != ConnectionStatus::Connected {
            return;
        }
        let Some(frame) = self.queue.pop_front() else {
            return;
        };

        if self.deliver(frame).await && !self.queue.is_empty() {
            self.flush_at = Some(Box::pin(sleep(self.config.queued_send_delay)));
        }
    }

    /// Write one frame.  On failure the frame goes back to the head of the
    /// queue and the connection is treated as lost.
    async fn deliver(&mut self, frame: ClientFrame) -> bool {
        match self.write(&frame).await {
            Ok(()) => true,
            Err(TransportError::Protocol(e)) => {
                tracing::error!(error = %e, "dropping unencodable frame");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "send failed");
                self.queue.push_front(frame);
                self.connection_lost(ABNORMAL_CLOSE, e.to_string());
                false
            }
        }
    }

    async fn write(&mut self, frame: &ClientFrame) -> Result<()> {
        let text = frame.to_json()?;
        let link = self.link.as_mut().ok_or(TransportError::Closed)?;
        link.outbound.send(text).await
    }

    async fn on_heartbeat(&mut self) {
        if self.status != ConnectionStatus::Connected {
            return;
        }
        match self.write(&ClientFrame::Ping).await {
            Ok(()) => {
                tracing::debug!("ping sent");
                self.pong_deadline = Some(Box::pin(sleep(self.config.pong_timeout)));
                self.heartbeat_at = Some(Box::pin(sleep(self.config.heartbeat_interval)));
            }
            Err(e) => {
                tracing::error!(error = %e, "ping failed");
                self.connection_lost(ABNORMAL_CLOSE, e.to_string());
            }
        }
    }

    // -- inbound ------------------------------------------------------------

    /// Handle one socket item plus everything else already waiting, then
    /// release the buffered fragments.
    async fn on_incoming(&mut self, first: Option<Incoming>) {
        let mut item = first;
        loop {
            match item {
                None => {
                    self.connection_lost(ABNORMAL_CLOSE, "connection lost".to_string());
                    return;
                }
                Some(Incoming::Closed { code, reason }) => {
                    self.connection_lost(code, reason);
                    return;
                }
                Some(Incoming::Text(text)) => self.on_frame(ServerFrame::from_json(&text)),
                Some(Incoming::Binary(bytes)) => self.on_frame(ServerFrame::from_slice(&bytes)),
            }

            item = match self
                .link
                .as_mut()
                .and_then(|link| link.inbound.next().now_or_never())
            {
                Some(next) => next,
                None => break,
            };
        }

        let events = self.pipeline.end_burst();
        self.emit_all(events);
    }

    fn on_frame(&mut self, parsed: std::result::Result<ServerFrame, ProtocolError>) {
        // any traffic proves the peer is alive
        self.pong_deadline = None;

        let frame = match parsed {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed frame");
                return;
            }
        };
        tracing::debug!(kind = frame.kind(), "frame received");

        let events = self.pipeline.handle(frame, Instant::now());
        self.emit_all(events);
    }

    // -- shared state -------------------------------------------------------

    fn emit_all(&self, events: Vec<StreamEvent>) {
        if events.is_empty() {
            return;
        }
        self.publish();
        for event in &events {
            self.bus.emit(event);
        }
    }

    fn publish(&self) {
        let mut snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        snapshot.status = self.status;
        snapshot.stream.clone_from(self.pipeline.state());
    }
}

async fn next_output<F: Future + Unpin>(slot: &mut Option<F>) -> F::Output {
    match slot {
        Some(future) => future.await,
        None => pending().await,
    }
}

async fn next_incoming(link: &mut Option<Link>) -> Option<Incoming> {
    match link {
        Some(link) => link.inbound.next().await,
        None => pending().await,
    }
}

async fn fire(timer: &mut Timer) {
    match timer {
        Some(deadline) => deadline.as_mut().await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    use crate::memory::{memory_pair, MemoryServer};

    use super::*;

    fn config() -> TransportConfig {
        TransportConfig::new("ws://test")
    }

    fn harness(
        config: TransportConfig,
    ) -> (StreamTransport, MemoryServer, UnboundedReceiver<StreamEvent>) {
        let (connector, server) = memory_pair();
        let transport = StreamTransport::new(config, Arc::new(connector));

        let (tx, rx) = mpsc::unbounded_channel();
        for kind in EventKind::ALL {
            let tx = tx.clone();
            transport.on(kind, move |event| {
                let _ = tx.send(event.clone());
                Ok(())
            });
        }
        (transport, server, rx)
    }

    fn token(i: usize, content: &str) -> ServerFrame {
        ServerFrame::Token {
            message_id: "m1".into(),
            token: format!("w{i} "),
            content: content.into(),
            token_count: i as u64 + 1,
        }
    }

    fn parse(text: &str) -> ClientFrame {
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn connect_reaches_session_endpoint() {
        let (transport, mut server, mut events) = harness(config());

        transport.connect("s1").await.unwrap();
        assert_eq!(transport.get_connection_status(), ConnectionStatus::Connecting);

        let end = server.accept().await.unwrap();
        assert_eq!(end.url(), "ws://test/api/v1/ws/s1");
        assert_eq!(events.recv().await, Some(StreamEvent::Connected));
        assert!(transport.is_connected());
        assert_eq!(transport.get_stream_state().session_id.as_deref(), Some("s1"));
        assert!(!transport.is_streaming());
    }

    #[tokio::test(start_paused = true)]
    async fn queued_frames_flush_in_order_with_spacing() {
        let (transport, mut server, _events) = harness(config());

        transport.send_send_message("s1", "one", true).await.unwrap();
        transport.send_send_message("s1", "two", false).await.unwrap();
        transport.send_cancel_stream("s1", "m0").await.unwrap();
        transport.send_get_status("s1").await.unwrap();

        transport.connect("s1").await.unwrap();
        let mut end = server.accept().await.unwrap();

        let mut received = Vec::new();
        let mut times = Vec::new();
        for _ in 0..4 {
            received.push(parse(&end.recv().await.unwrap()));
            times.push(Instant::now());
        }

        assert_eq!(
            received,
            vec![
                ClientFrame::SendMessage {
                    session_id: "s1".into(),
                    message: "one".into(),
                    stream: true
                },
                ClientFrame::SendMessage {
                    session_id: "s1".into(),
                    message: "two".into(),
                    stream: false
                },
                ClientFrame::CancelStream {
                    session_id: "s1".into(),
                    message_id: "m0".into()
                },
                ClientFrame::GetStatus {
                    session_id: "s1".into()
                },
            ]
        );
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(10));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sends_immediately_when_connected() {
        let (transport, mut server, mut events) = harness(config());
        transport.connect("s1").await.unwrap();
        let mut end = server.accept().await.unwrap();
        assert_eq!(events.recv().await, Some(StreamEvent::Connected));

        transport.send_get_status("s1").await.unwrap();
        let sent = parse(&end.recv().await.unwrap());
        assert_eq!(
            sent,
            ClientFrame::GetStatus {
                session_id: "s1".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn queue_cap_rejects_when_full() {
        let (transport, _server, _events) = harness(TransportConfig {
            max_pending: Some(2),
            ..config()
        });

        transport.send_get_status("s1").await.unwrap();
        transport.send_get_status("s1").await.unwrap();
        let err = transport.send_get_status("s1").await.unwrap_err();
        assert!(matches!(err, TransportError::QueueFull(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_delay_doubles_and_resets() {
        let (transport, mut server, mut events) = harness(config());
        transport.connect("s1").await.unwrap();
        let end = server.accept().await.unwrap();
        assert_eq!(events.recv().await, Some(StreamEvent::Connected));

        server.refuse_connections(true);
        drop(end);
        assert!(matches!(
            events.recv().await,
            Some(StreamEvent::Disconnected { code: 1006, .. })
        ));

        let mut last = Instant::now();
        let mut gaps = Vec::new();
        for _ in 0..6 {
            match events.recv().await {
                Some(StreamEvent::Disconnected { .. }) => {}
                other => panic!("unexpected event: {other:?}"),
            }
            gaps.push((Instant::now() - last).as_secs());
            last = Instant::now();
        }
        assert_eq!(gaps, vec![1, 2, 4, 8, 16, 30]);
        assert_eq!(transport.get_connection_status(), ConnectionStatus::Disconnected);

        server.refuse_connections(false);
        let end = server.accept().await.unwrap();
        assert_eq!(events.recv().await, Some(StreamEvent::Connected));

        // a successful connection resets the delay
        let dropped_at = Instant::now();
        drop(end);
        let _end = server.accept().await.unwrap();
        assert_eq!((Instant::now() - dropped_at).as_secs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_is_final() {
        let (transport, mut server, mut events) = harness(config());
        transport.send_get_status("s1").await.unwrap();
        transport.connect("s1").await.unwrap();
        let mut end = server.accept().await.unwrap();
        assert!(end.recv().await.is_some());
        assert_eq!(events.recv().await, Some(StreamEvent::Connected));

        transport.disconnect().await.unwrap();
        assert_eq!(
            events.recv().await,
            Some(StreamEvent::Disconnected {
                code: NORMAL_CLOSE,
                reason: "client disconnect".into()
            })
        );
        assert!(end.recv().await.is_none());
        assert_eq!(transport.get_connection_status(), ConnectionStatus::Disconnected);
        assert_eq!(transport.get_stream_state().session_id, None);

        assert!(timeout(Duration::from_secs(300), server.accept())
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect_and_queue() {
        let (transport, mut server, mut events) = harness(config());
        transport.connect("s1").await.unwrap();
        let end = server.accept().await.unwrap();
        assert_eq!(events.recv().await, Some(StreamEvent::Connected));

        drop(end);
        assert!(matches!(
            events.recv().await,
            Some(StreamEvent::Disconnected { code: 1006, .. })
        ));
        transport.send_send_message("s1", "stale", true).await.unwrap();
        transport.disconnect().await.unwrap();

        assert!(timeout(Duration::from_secs(60), server.accept())
            .await
            .is_err());

        transport.connect("s1").await.unwrap();
        let mut end = server.accept().await.unwrap();
        transport.send_get_status("s1").await.unwrap();
        assert_eq!(
            parse(&end.recv().await.unwrap()),
            ClientFrame::GetStatus {
                session_id: "s1".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn connect_replaces_previous_link() {
        let (transport, mut server, _events) = harness(config());
        transport.connect("s1").await.unwrap();
        let mut first = server.accept().await.unwrap();

        transport.connect("s2").await.unwrap();
        let second = server.accept().await.unwrap();

        assert!(first.recv().await.is_none());
        assert_eq!(second.url(), "ws://test/api/v1/ws/s2");
        assert_eq!(transport.get_stream_state().session_id.as_deref(), Some("s2"));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_pong_drops_and_reconnects() {
        let (transport, mut server, mut events) = harness(config());
        transport.connect("s1").await.unwrap();
        let mut end = server.accept().await.unwrap();
        assert_eq!(events.recv().await, Some(StreamEvent::Connected));

        let start = Instant::now();
        assert_eq!(parse(&end.recv().await.unwrap()), ClientFrame::Ping);
        assert_eq!((Instant::now() - start).as_secs(), 30);

        assert!(end.recv().await.is_none());
        assert_eq!((Instant::now() - start).as_secs(), 35);
        assert_eq!(
            events.recv().await,
            Some(StreamEvent::Disconnected {
                code: 1006,
                reason: "heartbeat timeout".into()
            })
        );

        let _again = server.accept().await.unwrap();
        assert_eq!((Instant::now() - start).as_secs(), 36);
        assert_eq!(events.recv().await, Some(StreamEvent::Connected));
        assert!(transport.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn pong_keeps_connection_alive() {
        let (transport, mut server, mut events) = harness(config());
        transport.connect("s1").await.unwrap();
        let mut end = server.accept().await.unwrap();
        assert_eq!(events.recv().await, Some(StreamEvent::Connected));

        for _ in 0..3 {
            assert_eq!(parse(&end.recv().await.unwrap()), ClientFrame::Ping);
            end.send_frame(&ServerFrame::Pong);
        }
        assert!(transport.is_connected());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn token_flood_is_batched_without_loss() {
        let (transport, mut server, mut events) = harness(config());
        transport.connect("s1").await.unwrap();
        let end = server.accept().await.unwrap();
        assert_eq!(events.recv().await, Some(StreamEvent::Connected));

        let mut content = String::new();
        for i in 0..250 {
            content.push_str(&format!("w{i} "));
            end.send_frame(&token(i, &content));
        }
        end.send_frame(&ServerFrame::Complete {
            message_id: "m1".into(),
            content: content.clone(),
            token_count: 250,
            cancelled: false,
        });

        let mut forwarded = String::new();
        let mut token_events = 0;
        let mut backpressure = Vec::new();
        loop {
            match events.recv().await.unwrap() {
                StreamEvent::Token { token, .. } => {
                    token_events += 1;
                    forwarded.push_str(&token);
                }
                StreamEvent::Backpressure { active } => backpressure.push(active),
                StreamEvent::Complete {
                    content: final_content,
                    ..
                } => {
                    assert_eq!(final_content, content);
                    break;
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }

        assert_eq!(forwarded, content);
        assert!(token_events < 250);
        assert_eq!(backpressure, vec![true, false]);
        assert!(!transport.is_streaming());
    }

    #[tokio::test(start_paused = true)]
    async fn health_goes_stale_without_tokens() {
        let (transport, mut server, mut events) = harness(TransportConfig {
            heartbeat_interval: Duration::from_secs(3_600),
            ..config()
        });
        transport.connect("s1").await.unwrap();
        let end = server.accept().await.unwrap();
        assert_eq!(events.recv().await, Some(StreamEvent::Connected));
        assert!(transport.check_connection_health().healthy);

        end.send_frame(&token(0, "w0 "));
        assert!(matches!(
            events.recv().await,
            Some(StreamEvent::Token { .. })
        ));
        assert!(transport.is_streaming());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(transport.check_connection_health().healthy);
        tokio::time::advance(Duration::from_secs(1)).await;
        let report = transport.check_connection_health();
        assert!(!report.healthy);
        assert!(report.streaming);
        assert!(transport.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frames_are_ignored() {
        let (transport, mut server, mut events) = harness(config());
        transport.connect("s1").await.unwrap();
        let end = server.accept().await.unwrap();
        assert_eq!(events.recv().await, Some(StreamEvent::Connected));

        end.send_text("{not json");
        end.send_text(r#"{"type":"telemetry"}"#);
        end.send_frame(&ServerFrame::Status {
            status: "idle".into(),
            message_id: None,
            token_count: 0,
        });

        assert_eq!(
            events.recv().await,
            Some(StreamEvent::Status {
                status: "idle".into(),
                message_id: None,
                token_count: 0
            })
        );
        assert!(transport.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn turn_error_keeps_connection() {
        let (transport, mut server, mut events) = harness(config());
        transport.connect("s1").await.unwrap();
        let end = server.accept().await.unwrap();
        assert_eq!(events.recv().await, Some(StreamEvent::Connected));

        end.send_frame(&token(0, "w0 "));
        assert!(matches!(events.recv().await, Some(StreamEvent::Token { .. })));

        end.send_frame(&ServerFrame::Error {
            message_id: Some("m1".into()),
            error: "generation_failed".into(),
            message: "model unavailable".into(),
        });
        assert_eq!(
            events.recv().await,
            Some(StreamEvent::Error {
                message_id: Some("m1".into()),
                error: "generation_failed".into(),
                message: "model unavailable".into()
            })
        );
        assert!(!transport.is_streaming());
        assert!(transport.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn close_frame_code_is_reported() {
        let (transport, mut server, mut events) = harness(config());
        transport.connect("s1").await.unwrap();
        let end = server.accept().await.unwrap();
        assert_eq!(events.recv().await, Some(StreamEvent::Connected));

        end.close(4001, "session expired");
        assert_eq!(
            events.recv().await,
            Some(StreamEvent::Disconnected {
                code: 4001,
                reason: "session expired".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_task() {
        let (transport, _server, _events) = harness(config());
        transport.shutdown().await;
        assert!(matches!(
            transport.connect("s1").await,
            Err(TransportError::Shutdown)
        ));
    }
}
