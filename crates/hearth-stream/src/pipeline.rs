//! Inbound frame handling: turns [`ServerFrame`]s into [`StreamEvent`]s while
//! tracking the in-flight turn and guarding against token floods.
//!
//! Token fragments go into a buffer.  The transport calls
//! [`TokenPipeline::end_burst`] once it has drained every frame that was ready,
//! which forwards the buffered fragments one event each.  A single fragment
//! therefore goes out right away, while a flood accumulates: at the threshold
//! backpressure is raised (once per turn), and at twice the threshold the
//! buffer is force-flushed as one concatenated token event.  Nothing is ever
//! dropped, and each fragment is forwarded exactly once.

use hearth_shared::ServerFrame;
use tokio::time::Instant;

use crate::events::StreamEvent;
use crate::state::StreamState;

#[derive(Debug, Clone)]
struct Fragment {
    token: String,
    message_id: String,
    content: String,
    token_count: u64,
}

#[derive(Debug)]
pub struct TokenPipeline {
    threshold: usize,
    buffer: Vec<Fragment>,
    state: StreamState,
}

impl TokenPipeline {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            buffer: Vec::new(),
            state: StreamState::default(),
        }
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn set_session(&mut self, session_id: Option<String>) {
        self.state.session_id = session_id;
    }

    /// Apply one inbound frame.  Returns the events to emit, in order.
    pub fn handle(&mut self, frame: ServerFrame, now: Instant) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        match frame {
            ServerFrame::Token {
                message_id,
                token,
                content,
                token_count,
            } => {
                self.state.message_id = Some(message_id.clone());
                self.state.content = content.clone();
                self.state.token_count = token_count;
                self.state.last_token_at = Some(now);

                self.buffer.push(Fragment {
                    token,
                    message_id,
                    content,
                    token_count,
                });

                if self.buffer.len() >= self.threshold && !self.state.backpressure_active {
                    self.state.backpressure_active = true;
                    tracing::debug!(buffered = self.buffer.len(), "backpressure raised");
                    events.push(StreamEvent::Backpressure { active: true });
                }

                if self.buffer.len() >= self.threshold * 2 {
                    tracing::debug!(buffered = self.buffer.len(), "force-flushing token buffer");
                    events.extend(self.flush_concatenated());
                }
            }
            ServerFrame::Complete {
                message_id,
                content,
                token_count,
                cancelled,
            } => {
                events.extend(self.clear_backpressure());
                self.state.content = content.clone();
                self.state.token_count = token_count;
                events.extend(self.flush_concatenated());
                if cancelled {
                    tracing::debug!(%message_id, "turn cancelled by server");
                }
                events.push(StreamEvent::Complete {
                    message_id,
                    content,
                    token_count,
                });
                self.state.reset_turn();
            }
            ServerFrame::Error {
                message_id,
                error,
                message,
            } => {
                events.extend(self.clear_backpressure());
                events.extend(self.end_burst());
                events.push(StreamEvent::Error {
                    message_id,
                    error,
                    message,
                });
                self.state.reset_turn();
            }
            ServerFrame::Status {
                status,
                message_id,
                token_count,
            } => {
                events.extend(self.end_burst());
                events.push(StreamEvent::Status {
                    status,
                    message_id,
                    token_count,
                });
            }
            ServerFrame::Pong => {}
        }

        self.state.buffered_tokens = self.buffer.len();
        events
    }

    /// Forward every buffered fragment as its own token event.
    pub fn end_burst(&mut self) -> Vec<StreamEvent> {
        let events = self
            .buffer
            .drain(..)
            .map(|fragment| StreamEvent::Token {
                token: fragment.token,
                message_id: fragment.message_id,
                content: fragment.content,
                token_count: fragment.token_count,
            })
            .collect();
        self.state.buffered_tokens = 0;
        events
    }

    /// Forward what is buffered and forget the turn.  Used when the session
    /// is dropped by the client.
    pub fn abandon_turn(&mut self) -> Vec<StreamEvent> {
        let mut events = self.end_burst();
        events.extend(self.clear_backpressure());
        self.state.reset_turn();
        events
    }

    fn flush_concatenated(&mut self) -> Option<StreamEvent> {
        let last = self.buffer.last()?.clone();
        let token: String = self.buffer.drain(..).map(|f| f.token).collect();
        self.state.buffered_tokens = 0;
        Some(StreamEvent::Token {
            token,
            message_id: last.message_id,
            content: last.content,
            token_count: last.token_count,
        })
    }

    fn clear_backpressure(&mut self) -> Option<StreamEvent> {
        if !self.state.backpressure_active {
            return None;
        }
        self.state.backpressure_active = false;
        tracing::debug!("backpressure cleared");
        Some(StreamEvent::Backpressure { active: false })
    }
}
