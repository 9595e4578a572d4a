//! # hearth
//!
//! Terminal chat client for a locally hosted model.
//!
//! Reads prompts from stdin and prints the streamed reply.  Lines starting
//! with `/` are commands: `/status`, `/cancel`, `/history`, `/quit`.

use std::io::Write;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use hearth_client::{init_tracing, AppContext, ClientConfig};
use hearth_stream::{EventKind, StreamEvent};

/// How often logically expired rows are physically removed.
const PURGE_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Tracing and configuration
    // -----------------------------------------------------------------------
    init_tracing();
    info!("Starting hearth v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    let session_id = std::env::var("HEARTH_SESSION_ID")
        .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());

    // -----------------------------------------------------------------------
    // 2. Store, transport, output handlers
    // -----------------------------------------------------------------------
    let ctx = AppContext::open(config).await?;
    register_output(&ctx);

    let store = ctx.store().clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = store.purge_expired().await {
                warn!(error = %e, "purge failed");
            }
        }
    });

    ctx.connect(&session_id).await?;
    eprintln!("session {session_id}");

    // -----------------------------------------------------------------------
    // 3. Prompt loop (until EOF, /quit or Ctrl+C)
    // -----------------------------------------------------------------------
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(&ctx, &session_id, line.trim()).await {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    ctx.transport().disconnect().await?;
    ctx.close().await;
    Ok(())
}

/// Returns `false` when the user asked to quit.
async fn handle_line(ctx: &AppContext, session_id: &str, line: &str) -> bool {
    let result = match line {
        "" => Ok(()),
        "/quit" => return false,
        "/status" => ctx
            .transport()
            .send_get_status(session_id)
            .await
            .map_err(anyhow::Error::from),
        "/cancel" => match ctx.transport().get_stream_state().message_id {
            Some(message_id) => ctx
                .transport()
                .send_cancel_stream(session_id, &message_id)
                .await
                .map_err(anyhow::Error::from),
            None => {
                eprintln!("nothing to cancel");
                Ok(())
            }
        },
        "/history" => ctx.history(session_id).await.map(|messages| {
            for message in messages {
                println!("[{}] {}", message.role.as_str(), message.content);
            }
        }),
        prompt => ctx.send_user_message(session_id, prompt).await.map(|_| ()),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
    }
    true
}

fn register_output(ctx: &AppContext) {
    let transport = ctx.transport();

    transport.on(EventKind::Token, |event| {
        if let StreamEvent::Token { token, .. } = event {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(token.as_bytes())?;
            stdout.flush()?;
        }
        Ok(())
    });
    transport.on(EventKind::Complete, |_| {
        println!();
        Ok(())
    });
    transport.on(EventKind::Error, |event| {
        if let StreamEvent::Error { error, message, .. } = event {
            eprintln!("\n[error] {error}: {message}");
        }
        Ok(())
    });
    transport.on(EventKind::Status, |event| {
        if let StreamEvent::Status {
            status,
            token_count,
            ..
        } = event
        {
            eprintln!("[status] {status} ({token_count} tokens)");
        }
        Ok(())
    });
    transport.on(EventKind::Connected, |_| {
        eprintln!("[connected]");
        Ok(())
    });
    transport.on(EventKind::Disconnected, |event| {
        if let StreamEvent::Disconnected { code, reason } = event {
            eprintln!("[disconnected {code}] {reason}");
        }
        Ok(())
    });
    transport.on(EventKind::Backpressure, |event| {
        if let StreamEvent::Backpressure { active: true } = event {
            warn!("token stream is outpacing the terminal");
        }
        Ok(())
    });
}
