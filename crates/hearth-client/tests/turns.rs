use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use hearth_client::{AppContext, ClientConfig};
use hearth_shared::{ClientFrame, ServerFrame};
use hearth_store::{MessageStatus, PersistentStore, Role, StoreConfig};
use hearth_stream::memory::memory_pair;
use hearth_stream::{
    Connector, EventKind, Link, StreamEvent, TransportConfig, TransportError,
};

fn config(dir: &tempfile::TempDir) -> ClientConfig {
    ClientConfig {
        db_path: Some(dir.path().join("hearth.db")),
        transport: TransportConfig::new("ws://test"),
        ..ClientConfig::default()
    }
}

fn watch(ctx: &AppContext, kind: EventKind) -> mpsc::UnboundedReceiver<StreamEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    ctx.transport().on(kind, move |event| {
        let _ = tx.send(event.clone());
        Ok(())
    });
    rx
}

fn token(token: &str, content: &str, token_count: u64) -> ServerFrame {
    ServerFrame::Token {
        message_id: "a1".into(),
        token: token.into(),
        content: content.into(),
        token_count,
    }
}

fn reopen(dir: &tempfile::TempDir) -> PersistentStore {
    PersistentStore::open_at(&dir.path().join("hearth.db"), StoreConfig::default()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn streamed_turn_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let (connector, mut server) = memory_pair();
    let ctx = AppContext::open_with(config(&dir), Arc::new(connector))
        .await
        .unwrap();
    let mut completions = watch(&ctx, EventKind::Complete);

    ctx.connect("s1").await.unwrap();
    let mut end = server.accept().await.unwrap();

    let user = ctx
        .send_user_message("s1", "Why is the sky blue?")
        .await
        .unwrap();
    assert_eq!(user.status, MessageStatus::Complete);

    let sent: ClientFrame = serde_json::from_str(&end.recv().await.unwrap()).unwrap();
    assert_eq!(
        sent,
        ClientFrame::SendMessage {
            session_id: "s1".into(),
            message: "Why is the sky blue?".into(),
            stream: true,
        }
    );

    end.send_frame(&token("Rayleigh", "Rayleigh", 1));
    end.send_frame(&token(" scattering", "Rayleigh scattering", 2));
    end.send_text(
        r#"{"type":"complete","message_id":"a1","accumulated_content":"Rayleigh scattering","token_count":2}"#,
    );
    assert!(matches!(
        completions.recv().await,
        Some(StreamEvent::Complete { .. })
    ));

    ctx.close().await;

    let store = reopen(&dir);
    let session = store.get_session("s1").await.unwrap().unwrap();
    assert_eq!(session.name, "Why is the sky blue?");

    let messages = store.list_messages("s1").await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "Why is the sky blue?");

    let reply = &messages[1];
    assert_eq!(reply.id, "a1");
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.status, MessageStatus::Complete);
    assert_eq!(reply.content, "Rayleigh scattering");
    assert!(reply.streaming_content.is_empty());
    assert_eq!(reply.token_count, Some(2));
}

#[tokio::test(start_paused = true)]
async fn failed_turn_keeps_partial_text() {
    let dir = tempfile::tempdir().unwrap();
    let (connector, mut server) = memory_pair();
    let ctx = AppContext::open_with(config(&dir), Arc::new(connector))
        .await
        .unwrap();
    let mut errors = watch(&ctx, EventKind::Error);

    ctx.connect("s1").await.unwrap();
    let end = server.accept().await.unwrap();
    ctx.send_user_message("s1", "hello").await.unwrap();

    end.send_frame(&token("Hi", "Hi", 1));
    end.send_frame(&ServerFrame::Error {
        message_id: Some("a1".into()),
        error: "generation_failed".into(),
        message: "model went away".into(),
    });
    assert!(matches!(
        errors.recv().await,
        Some(StreamEvent::Error { .. })
    ));

    ctx.close().await;

    let store = reopen(&dir);
    let reply = store.get_message("a1").await.unwrap().unwrap();
    assert_eq!(reply.status, MessageStatus::Error);
    assert_eq!(reply.content, "Hi");
}

/// A backend that is never reachable.
struct Unreachable;

#[async_trait]
impl Connector for Unreachable {
    async fn connect(&self, url: &str) -> Result<Link, TransportError> {
        Err(TransportError::Connect(format!("{url} is unreachable")))
    }
}

#[tokio::test(start_paused = true)]
async fn offline_prompts_queue_until_the_cap() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&dir);
    config.transport.max_pending = Some(1);
    let ctx = AppContext::open_with(config, Arc::new(Unreachable))
        .await
        .unwrap();
    let mut disconnects = watch(&ctx, EventKind::Disconnected);

    ctx.connect("s1").await.unwrap();
    assert!(matches!(
        disconnects.recv().await,
        Some(StreamEvent::Disconnected { code: 1006, .. })
    ));

    let queued = ctx.send_user_message("s1", "first").await.unwrap();
    assert_eq!(queued.status, MessageStatus::Complete);

    let err = ctx.send_user_message("s1", "second").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TransportError>(),
        Some(TransportError::QueueFull(1))
    ));

    let history = ctx.history("s1").await.unwrap();
    let statuses: Vec<_> = history.iter().map(|m| m.status).collect();
    assert_eq!(statuses, vec![MessageStatus::Complete, MessageStatus::Error]);

    ctx.close().await;
}
