//! Persists streamed assistant turns.
//!
//! Event handlers run on the transport task and must not block, so they only
//! forward what they saw to a writer task that owns all store access.  The
//! assistant message is saved as `streaming` on its first token and rewritten
//! as `complete` or `error` when the turn ends.  Storage failures are logged
//! and never reach the transport.

use chrono::Utc;
use hearth_store::{Message, MessageStatus, PersistentStore, Role};
use hearth_stream::{EventKind, HandlerId, StreamEvent, StreamTransport};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug)]
enum TurnUpdate {
    Token {
        session_id: String,
        message_id: String,
        content: String,
        token_count: u64,
    },
    Complete {
        session_id: String,
        message_id: String,
        content: String,
        token_count: u64,
    },
    Failed {
        message_id: Option<String>,
        message: String,
    },
}

pub struct TurnRecorder {
    transport: StreamTransport,
    handlers: Vec<(EventKind, HandlerId)>,
    writer: JoinHandle<()>,
}

impl TurnRecorder {
    /// Subscribe to `transport` and start the writer task.
    pub fn attach(store: PersistentStore, transport: &StreamTransport) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut handlers = Vec::new();

        for kind in [EventKind::Token, EventKind::Complete, EventKind::Error] {
            let tx = tx.clone();
            let reader = transport.clone();
            let id = transport.on(kind, move |event| {
                let Some(update) = to_update(event, &reader) else {
                    return Ok(());
                };
                tx.send(update)
                    .map_err(|_| anyhow::anyhow!("turn recorder has stopped"))
            });
            handlers.push((kind, id));
        }

        Self {
            transport: transport.clone(),
            handlers,
            writer: tokio::spawn(write_loop(store, rx)),
        }
    }

    /// Unsubscribe and wait until every update seen so far is written.
    pub async fn stop(self) {
        for (kind, id) in self.handlers {
            self.transport.off(kind, id);
        }
        if let Err(e) = self.writer.await {
            warn!(error = %e, "turn recorder task failed");
        }
    }
}

fn to_update(event: &StreamEvent, transport: &StreamTransport) -> Option<TurnUpdate> {
    match event {
        StreamEvent::Token {
            message_id,
            content,
            token_count,
            ..
        } => Some(TurnUpdate::Token {
            session_id: transport.get_stream_state().session_id?,
            message_id: message_id.clone(),
            content: content.clone(),
            token_count: *token_count,
        }),
        StreamEvent::Complete {
            message_id,
            content,
            token_count,
        } => Some(TurnUpdate::Complete {
            session_id: transport.get_stream_state().session_id?,
            message_id: message_id.clone(),
            content: content.clone(),
            token_count: *token_count,
        }),
        StreamEvent::Error {
            message_id,
            message,
            error,
        } => Some(TurnUpdate::Failed {
            message_id: message_id.clone(),
            message: if message.is_empty() {
                error.clone()
            } else {
                message.clone()
            },
        }),
        _ => None,
    }
}

async fn write_loop(store: PersistentStore, mut rx: mpsc::UnboundedReceiver<TurnUpdate>) {
    // the assistant message being streamed, as last saved
    let mut current: Option<Message> = None;

    while let Some(update) = rx.recv().await {
        match update {
            TurnUpdate::Token {
                session_id,
                message_id,
                content,
                token_count,
            } => {
                if let Some(message) = current.as_mut().filter(|m| m.id == message_id) {
                    // only the first token is written; the rest stay in memory
                    message.streaming_content = content;
                    message.token_count = Some(token_count);
                    continue;
                }

                let mut message = Message::new(
                    message_id,
                    session_id,
                    Role::Assistant,
                    String::new(),
                    Utc::now(),
                );
                message.status = MessageStatus::Streaming;
                message.streaming_content = content;
                message.token_count = Some(token_count);
                save(&store, &message).await;
                current = Some(message);
            }
            TurnUpdate::Complete {
                session_id,
                message_id,
                content,
                token_count,
            } => {
                let mut message = match current.take() {
                    Some(message) if message.id == message_id => message,
                    _ => Message::new(
                        message_id,
                        session_id.clone(),
                        Role::Assistant,
                        String::new(),
                        Utc::now(),
                    ),
                };
                message.content = content;
                message.streaming_content.clear();
                message.status = MessageStatus::Complete;
                message.token_count = Some(token_count);
                save(&store, &message).await;

                if let Err(e) = store.touch_session(&session_id).await {
                    warn!(error = %e, "failed to touch session");
                }
                debug!(message_id = %message.id, "assistant turn recorded");
            }
            TurnUpdate::Failed {
                message_id,
                message: reason,
            } => {
                let Some(mut message) = current.take() else {
                    continue;
                };
                if message_id.as_deref().is_some_and(|id| id != message.id) {
                    current = Some(message);
                    continue;
                }
                message.content = std::mem::take(&mut message.streaming_content);
                message.status = MessageStatus::Error;
                save(&store, &message).await;
                debug!(message_id = %message.id, %reason, "assistant turn failed");
            }
        }
    }
}

async fn save(store: &PersistentStore, message: &Message) {
    if let Err(e) = store.save_message(message).await {
        warn!(message_id = %message.id, error = %e, "failed to persist assistant message");
    }
}
