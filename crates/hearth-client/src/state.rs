//! Application context: the one store and the one transport, owned together.
//!
//! [`AppContext`] is built once by the binary (or a test) and passed to
//! whatever needs it.  Closing it stops the turn recorder, shuts the
//! transport down and closes the database, in that order.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use hearth_store::{Message, MessageStatus, PersistentStore, Role, Session};
use hearth_stream::{Connector, StreamTransport, WsConnector};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::recorder::TurnRecorder;

/// Session names are cut to this many characters of the first prompt.
const SESSION_NAME_CHARS: usize = 40;

pub struct AppContext {
    store: PersistentStore,
    transport: StreamTransport,
    recorder: TurnRecorder,
}

impl AppContext {
    /// Open the database and start a WebSocket transport.
    pub async fn open(config: ClientConfig) -> anyhow::Result<Self> {
        Self::open_with(config, Arc::new(WsConnector)).await
    }

    /// Same as [`open`](Self::open) with a custom connector.
    pub async fn open_with(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
    ) -> anyhow::Result<Self> {
        let store = match &config.db_path {
            Some(path) => PersistentStore::open_at(path, config.store.clone())
                .with_context(|| format!("opening database at {}", path.display()))?,
            None => PersistentStore::open_default(config.store.clone())
                .context("opening default database")?,
        };

        let transport = StreamTransport::new(config.transport.clone(), connector);
        let recorder = TurnRecorder::attach(store.clone(), &transport);

        tracing::info!(server = %config.transport.base_url, "application context ready");
        Ok(Self {
            store,
            transport,
            recorder,
        })
    }

    pub fn store(&self) -> &PersistentStore {
        &self.store
    }

    pub fn transport(&self) -> &StreamTransport {
        &self.transport
    }

    /// Connect the transport to `session_id`.
    pub async fn connect(&self, session_id: &str) -> anyhow::Result<()> {
        self.transport.connect(session_id).await?;
        Ok(())
    }

    /// Record a user prompt and send it for a streamed reply.
    ///
    /// The session is created on first use, named after the prompt.  The
    /// returned message is `complete` once handed to the transport (sent or
    /// queued) and `error` if the transport refused it.
    pub async fn send_user_message(&self, session_id: &str, text: &str) -> anyhow::Result<Message> {
        if self.store.get_session(session_id).await?.is_none() {
            let name: String = text.chars().take(SESSION_NAME_CHARS).collect();
            self.store
                .save_session(&Session::new(session_id, name.trim(), Utc::now()))
                .await?;
            tracing::info!(session_id, "session created");
        }

        let mut message = Message::new(
            Uuid::new_v4().to_string(),
            session_id,
            Role::User,
            text,
            Utc::now(),
        );
        message.status = MessageStatus::Sending;
        self.store.save_message(&message).await?;

        match self.transport.send_send_message(session_id, text, true).await {
            Ok(()) => {
                message.status = MessageStatus::Complete;
                Ok(self.store.save_message(&message).await?)
            }
            Err(e) => {
                message.status = MessageStatus::Error;
                self.store.save_message(&message).await?;
                Err(e).context("sending message")
            }
        }
    }

    /// Live messages of a session, oldest first.
    pub async fn history(&self, session_id: &str) -> anyhow::Result<Vec<Message>> {
        Ok(self.store.list_messages(session_id).await?)
    }

    pub async fn close(self) {
        self.recorder.stop().await;
        self.transport.shutdown().await;
        self.store.close().await;
        tracing::info!("application context closed");
    }
}
